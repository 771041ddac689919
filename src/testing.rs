use crate::{
    Error, Result,
    models::{Project, ProjectFilter},
    projects::ProjectRepository,
    schema::{SchemaConfig, SchemaManager},
};
use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

pub async fn migrate_core_schema(pool: &Pool<Postgres>) -> Result<()> {
    migrate_schema(pool, "public").await
}

pub async fn migrate_schema(pool: &Pool<Postgres>, schema: &str) -> Result<()> {
    SchemaManager::new(pool.clone())
        .sync(&SchemaConfig::with_base_schema(schema))
        .await?;
    Ok(())
}

struct StoredProject {
    project: Project,
    version: i32,
}

/// Process-local repository with the same version semantics as the
/// Postgres one. Each call clones the aggregate in or out, so callers never
/// share state except through `save`.
#[derive(Default)]
pub struct InMemoryProjects {
    rows: Mutex<HashMap<Uuid, StoredProject>>,
}

impl InMemoryProjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stored version regardless of owner.
    pub fn version_of(&self, id: Uuid) -> Option<i32> {
        let rows = self.rows.lock().expect("project map poisoned");
        rows.get(&id).map(|row| row.version)
    }

    pub fn len(&self) -> usize {
        self.rows.lock().expect("project map poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProjectRepository for InMemoryProjects {
    async fn create(&self, project: &Project) -> Result<i32> {
        let mut rows = self.rows.lock().expect("project map poisoned");
        if rows.contains_key(&project.id) {
            return Err(Error::Validation(format!(
                "project {} already exists",
                project.id
            )));
        }
        rows.insert(
            project.id,
            StoredProject {
                project: project.clone(),
                version: 1,
            },
        );
        Ok(1)
    }

    async fn load(&self, id: Uuid, owner_id: &str) -> Result<(Project, i32)> {
        let rows = self.rows.lock().expect("project map poisoned");
        match rows.get(&id) {
            Some(row) if row.project.owner_id == owner_id => Ok((row.project.clone(), row.version)),
            _ => Err(Error::ProjectNotFound(id)),
        }
    }

    async fn save(&self, project: &Project, expected: i32) -> Result<i32> {
        let mut rows = self.rows.lock().expect("project map poisoned");
        match rows.get_mut(&project.id) {
            Some(row) if row.project.owner_id == project.owner_id && row.version == expected => {
                row.project = project.clone();
                row.version += 1;
                Ok(row.version)
            }
            _ => Err(Error::VersionConflict),
        }
    }

    async fn list(&self, owner_id: &str, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let rows = self.rows.lock().expect("project map poisoned");
        let mut projects: Vec<Project> = rows
            .values()
            .filter(|row| row.project.owner_id == owner_id && filter.matches(&row.project))
            .map(|row| row.project.clone())
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn delete(&self, id: Uuid, owner_id: &str) -> Result<()> {
        let mut rows = self.rows.lock().expect("project map poisoned");
        let owned = rows
            .get(&id)
            .is_some_and(|row| row.project.owner_id == owner_id);
        if !owned {
            return Err(Error::ProjectNotFound(id));
        }
        rows.remove(&id);
        Ok(())
    }
}

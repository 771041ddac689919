use crate::{
    Error, Result, metrics,
    models::{Project, ProjectFilter},
    schema::{PROJECTS_TABLE, qualified_name},
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// Storage gateway for project aggregates.
///
/// Every aggregate carries a version. `save` is a whole-document replace
/// that only succeeds while the stored version still equals `expected`;
/// otherwise it fails with [`Error::VersionConflict`], including when the
/// project has been deleted in the meantime.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Store a new aggregate at version 1.
    async fn create(&self, project: &Project) -> Result<i32>;

    /// Load an aggregate with its version. Projects owned by someone else
    /// are reported as [`Error::ProjectNotFound`].
    async fn load(&self, id: Uuid, owner_id: &str) -> Result<(Project, i32)>;

    /// Replace the stored aggregate, returning the new version.
    async fn save(&self, project: &Project, expected: i32) -> Result<i32>;

    /// Owner's projects, newest first.
    async fn list(&self, owner_id: &str, filter: &ProjectFilter) -> Result<Vec<Project>>;

    async fn delete(&self, id: Uuid, owner_id: &str) -> Result<()>;
}

/// Postgres-backed repository: one JSONB row per project.
#[derive(Clone)]
pub struct Projects {
    pool: PgPool,
    table: String,
}

impl Projects {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            table: qualified_name(schema, PROJECTS_TABLE),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl ProjectRepository for Projects {
    async fn create(&self, project: &Project) -> Result<i32> {
        let json = serde_json::to_value(project)?;
        let version: i32 = sqlx::query_scalar(&format!(
            r#"insert into {} (id, owner_id, doc, version, created_at, updated_at)
               values ($1, $2, $3, 1, $4, $5)
               returning version"#,
            self.table
        ))
        .bind(project.id)
        .bind(&project.owner_id)
        .bind(&json)
        .bind(project.created_at)
        .bind(project.updated_at)
        .fetch_one(&self.pool)
        .await?;
        metrics::record_project_write();
        Ok(version)
    }

    async fn load(&self, id: Uuid, owner_id: &str) -> Result<(Project, i32)> {
        let row: Option<(Value, i32)> = sqlx::query_as(&format!(
            "select doc, version from {} where id = $1 and owner_id = $2",
            self.table
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((value, version)) => {
                let project: Project = serde_json::from_value(value)?;
                metrics::record_project_read();
                Ok((project, version))
            }
            None => Err(Error::ProjectNotFound(id)),
        }
    }

    async fn save(&self, project: &Project, expected: i32) -> Result<i32> {
        let json = serde_json::to_value(project)?;
        let rec: Option<(i32,)> = sqlx::query_as(&format!(
            r#"update {}
               set doc = $3,
                   version = version + 1,
                   updated_at = $4
               where id = $1 and owner_id = $2 and version = $5
               returning version"#,
            self.table
        ))
        .bind(project.id)
        .bind(&project.owner_id)
        .bind(&json)
        .bind(project.updated_at)
        .bind(expected)
        .fetch_optional(&self.pool)
        .await?;

        match rec {
            Some((version,)) => {
                metrics::record_project_write();
                Ok(version)
            }
            None => {
                metrics::record_project_conflict();
                Err(Error::VersionConflict)
            }
        }
    }

    async fn list(&self, owner_id: &str, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let mut qb = QueryBuilder::<Postgres>::new("select doc from ");
        qb.push(&self.table);
        qb.push(" where owner_id = ");
        qb.push_bind(owner_id.to_string());
        if let Some(area) = &filter.area {
            qb.push(" and doc->>'area' = ");
            qb.push_bind(area.clone());
        }
        if let Some(search) = &filter.search {
            let pattern = like_pattern(search);
            qb.push(" and (doc->>'name' ilike ");
            qb.push_bind(pattern.clone());
            qb.push(" or doc->>'area' ilike ");
            qb.push_bind(pattern);
            qb.push(")");
        }
        qb.push(" order by created_at desc");

        let rows = qb.build_query_as::<(Value,)>().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|(value,)| serde_json::from_value(value).map_err(Into::into))
            .collect()
    }

    async fn delete(&self, id: Uuid, owner_id: &str) -> Result<()> {
        let result = sqlx::query(&format!(
            "delete from {} where id = $1 and owner_id = $2",
            self.table
        ))
        .bind(id)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::ProjectNotFound(id));
        }
        Ok(())
    }
}

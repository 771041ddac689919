use crate::{
    Result,
    projects::Projects,
    schema::{SchemaConfig, SchemaManager},
    service::{PlotService, PlotServiceConfig},
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;

/// Connection pool plus the settings shared by repositories and services.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    schema: String,
    service_config: PlotServiceConfig,
}

impl Store {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        Ok(Self {
            pool,
            schema: SchemaConfig::default().base_schema,
            service_config: PlotServiceConfig::default(),
        })
    }

    pub fn builder(url: impl Into<String>) -> StoreBuilder {
        StoreBuilder::new(url)
    }

    pub fn projects(&self) -> Projects {
        Projects::new(self.pool.clone(), &self.schema)
    }

    /// Plot service over the Postgres repository using the store's retry policy.
    pub fn plots(&self) -> PlotService<Projects> {
        PlotService::from_shared(Arc::new(self.projects()), self.service_config.clone())
    }

    pub fn schema(&self) -> SchemaManager {
        SchemaManager::new(self.pool.clone())
    }

    pub fn schema_config(&self) -> SchemaConfig {
        SchemaConfig::with_base_schema(self.schema.clone())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Lightweight liveness check for the connection pool.
    pub async fn pool_health(&self) -> Result<PoolHealth> {
        let one: i32 = sqlx::query_scalar("select 1").fetch_one(&self.pool).await?;
        Ok(PoolHealth { ok: one == 1 })
    }
}

pub struct StoreBuilder {
    url: String,
    max_connections: Option<u32>,
    connect_timeout: Option<Duration>,
    schema: String,
    conflict_retries: u32,
}

impl StoreBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: None,
            connect_timeout: None,
            schema: SchemaConfig::default().base_schema,
            conflict_retries: PlotServiceConfig::default().max_conflict_retries,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max.max(1));
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Postgres schema holding the `projects` table.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Reload-and-retry rounds after a version conflict. Zero surfaces the
    /// first conflict to the caller.
    pub fn conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    pub async fn build(self) -> Result<Store> {
        let mut opts = PgPoolOptions::new();
        if let Some(max) = self.max_connections {
            opts = opts.max_connections(max);
        }
        if let Some(t) = self.connect_timeout {
            opts = opts.acquire_timeout(t);
        }
        let pool = opts.connect(&self.url).await?;
        Ok(Store {
            pool,
            schema: self.schema,
            service_config: PlotServiceConfig {
                max_conflict_retries: self.conflict_retries,
            },
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PoolHealth {
    pub ok: bool,
}

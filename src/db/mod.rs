//! Database connection management
//!
//! The core and ledger stores are separate PostgreSQL databases; each gets
//! its own pool.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::StorageConfig;

/// PostgreSQL database connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;

        tracing::info!(max_connections, "PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    /// Connect using the storage section of the app config
    pub async fn connect_with(
        config: &StorageConfig,
        database_url: &str,
    ) -> Result<Self, sqlx::Error> {
        Self::connect(
            database_url,
            config.max_connections,
            Duration::from_secs(config.acquire_timeout_secs),
        )
        .await
    }

    pub fn into_pool(self) -> PgPool {
        self.pool
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

//! PostgreSQL pool behind the lending store

use sqlx::migrate::MigrateError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum DbError {
    #[error("DATABASE_URL is not set")]
    Unconfigured,

    #[error("cannot connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("schema migration failed: {0}")]
    Migrate(#[from] MigrateError),
}

/// Pooled connection to the lending database
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Opens the pool at the configured URL and brings the schema up to date
    pub async fn connect(config: &Config) -> Result<Self, DbError> {
        let url = config.database_url.as_deref().ok_or(DbError::Unconfigured)?;
        let masked = config.database_url_masked().unwrap_or_default();

        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .idle_timeout(IDLE_TIMEOUT)
            .connect(url)
            .await
            .map_err(|source| DbError::Connect {
                url: masked.clone(),
                source,
            })?;
        tracing::info!(
            url = %masked,
            max_connections = config.db_max_connections,
            "Database pool ready"
        );

        let database = Self::from_pool(pool);
        database.migrate().await?;
        Ok(database)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Lending schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Whether a trivial query round-trips
    pub async fn is_healthy(&self) -> bool {
        match sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
        {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, "Database health check failed");
                false
            }
        }
    }
}

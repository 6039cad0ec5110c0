//! Shared PostgreSQL connection pool for Agora services

use crate::config::DatabaseConfig;
use crate::error::AgoraError;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

/// Shared database connection pool
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Create new database pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self, AgoraError> {
        info!(
            max_connections = config.max_connections,
            "Connecting to database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .idle_timeout(Some(config.idle_timeout))
            .acquire_timeout(config.connect_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| AgoraError::database("Failed to connect to database", e))?;

        info!("Database connection pool established");
        Ok(Self { pool })
    }

    /// Create pool from environment configuration
    pub async fn from_env() -> Result<Self, AgoraError> {
        use crate::config::ConfigLoader;

        let config = DatabaseConfig::from_env()?;
        config.validate()?;
        Self::new(&config).await
    }

    /// Get reference to underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check if pool is healthy
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
}

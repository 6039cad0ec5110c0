//! # Agora Core
//!
//! Shared infrastructure for Agora platform services.
//!
//! This crate provides the building blocks the affinity service (and future
//! platform services) lean on: configuration loading, the PostgreSQL
//! connection pool, error types, retry policies, health checks, and the
//! inbound user action event types.
//!
//! ## Modules
//!
//! - `config`: Configuration loading and validation
//! - `database`: Shared PostgreSQL connection pool
//! - `error`: Error types and handling
//! - `events`: Inbound user action event types
//! - `health`: Health check system
//! - `retry`: Exponential backoff retry utilities

pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod health;
pub mod retry;

// Re-export commonly used types
pub use config::{load_dotenv, ConfigLoader, DatabaseConfig, RedisConfig};
pub use database::{DatabasePool, PoolStats};
pub use error::AgoraError;
pub use events::{ActionEventError, ActionEventResult, ActionKind, UserActionEvent};
pub use health::{
    AggregatedHealth, ComponentHealth, HealthCheck, HealthChecker, HealthStatus, SimpleHealth,
};
pub use retry::{retry_with_backoff, RetryPolicy};

/// Result type alias for Agora operations
pub type Result<T> = std::result::Result<T, AgoraError>;

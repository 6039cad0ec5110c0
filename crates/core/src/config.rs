//! Shared configuration loader module for Agora services
//!
//! Provides a unified configuration loading system with environment variable
//! parsing, validation, and support for .env files. All configuration uses the
//! `AGORA_` prefix for environment variables, with bare fallbacks
//! (`DATABASE_URL`, `REDIS_URL`) for local development.
//!
//! # Example
//!
//! ```no_run
//! use agora_core::config::{ConfigLoader, DatabaseConfig, RedisConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Load .env file (optional)
//! dotenvy::dotenv().ok();
//!
//! let db_config = DatabaseConfig::from_env()?;
//! let redis_config = RedisConfig::from_env()?;
//!
//! db_config.validate()?;
//! redis_config.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::error::AgoraError;
use std::time::Duration;
use url::Url;

/// Configuration loader trait
///
/// Standardized methods for loading and validating configuration from
/// environment variables.
pub trait ConfigLoader: Sized {
    /// Load configuration from environment variables
    ///
    /// Reads environment variables with the `AGORA_` prefix and constructs a
    /// configuration instance with defaults for missing optional values.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if required variables are missing or
    /// values cannot be parsed.
    fn from_env() -> Result<Self, AgoraError>;

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if any validation check fails.
    fn validate(&self) -> Result<(), AgoraError>;
}

/// Database configuration
///
/// Configuration for PostgreSQL connections with pooling settings.
///
/// # Environment Variables
///
/// - `AGORA_DATABASE_URL` (required, falls back to `DATABASE_URL`)
/// - `AGORA_DATABASE_MAX_CONNECTIONS` (optional, default: 20)
/// - `AGORA_DATABASE_MIN_CONNECTIONS` (optional, default: 2)
/// - `AGORA_DATABASE_CONNECT_TIMEOUT` (optional, seconds, default: 30)
/// - `AGORA_DATABASE_IDLE_TIMEOUT` (optional, seconds, default: 600)
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle connection timeout duration
    pub idle_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/agora".to_string(),
            max_connections: 20,
            min_connections: 2,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

impl ConfigLoader for DatabaseConfig {
    fn from_env() -> Result<Self, AgoraError> {
        let url = std::env::var("AGORA_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .map_err(|_| AgoraError::ConfigurationError {
                message: "DATABASE_URL or AGORA_DATABASE_URL must be set".to_string(),
                key: Some("AGORA_DATABASE_URL".to_string()),
            })?;

        let max_connections = parse_env_var(
            "AGORA_DATABASE_MAX_CONNECTIONS",
            DatabaseConfig::default().max_connections,
        )?;

        let min_connections = parse_env_var(
            "AGORA_DATABASE_MIN_CONNECTIONS",
            DatabaseConfig::default().min_connections,
        )?;

        let connect_timeout_secs = parse_env_var("AGORA_DATABASE_CONNECT_TIMEOUT", 30u64)?;

        let idle_timeout_secs = parse_env_var("AGORA_DATABASE_IDLE_TIMEOUT", 600u64)?;

        Ok(Self {
            url,
            max_connections,
            min_connections,
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            idle_timeout: Duration::from_secs(idle_timeout_secs),
        })
    }

    fn validate(&self) -> Result<(), AgoraError> {
        Url::parse(&self.url).map_err(|e| AgoraError::ConfigurationError {
            message: format!("Invalid DATABASE_URL: {}", e),
            key: Some("AGORA_DATABASE_URL".to_string()),
        })?;

        if self.max_connections == 0 {
            return Err(AgoraError::ConfigurationError {
                message: "max_connections must be greater than 0".to_string(),
                key: Some("AGORA_DATABASE_MAX_CONNECTIONS".to_string()),
            });
        }

        if self.min_connections > self.max_connections {
            return Err(AgoraError::ConfigurationError {
                message: format!(
                    "min_connections ({}) cannot exceed max_connections ({})",
                    self.min_connections, self.max_connections
                ),
                key: Some("AGORA_DATABASE_MIN_CONNECTIONS".to_string()),
            });
        }

        if self.connect_timeout.as_secs() == 0 {
            return Err(AgoraError::ConfigurationError {
                message: "connect_timeout must be greater than 0 seconds".to_string(),
                key: Some("AGORA_DATABASE_CONNECT_TIMEOUT".to_string()),
            });
        }

        if self.idle_timeout.as_secs() == 0 {
            return Err(AgoraError::ConfigurationError {
                message: "idle_timeout must be greater than 0 seconds".to_string(),
                key: Some("AGORA_DATABASE_IDLE_TIMEOUT".to_string()),
            });
        }

        Ok(())
    }
}

/// Redis configuration
///
/// Configuration for the Redis connection backing the action queue.
///
/// # Environment Variables
///
/// - `AGORA_REDIS_URL` (required, falls back to `REDIS_URL`)
/// - `AGORA_REDIS_CONNECTION_TIMEOUT` (optional, seconds, default: 10)
/// - `AGORA_REDIS_RESPONSE_TIMEOUT` (optional, seconds, default: 5)
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Connection timeout duration
    pub connection_timeout: Duration,
    /// Response timeout duration
    pub response_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            connection_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(5),
        }
    }
}

impl ConfigLoader for RedisConfig {
    fn from_env() -> Result<Self, AgoraError> {
        let url = std::env::var("AGORA_REDIS_URL")
            .or_else(|_| std::env::var("REDIS_URL"))
            .map_err(|_| AgoraError::ConfigurationError {
                message: "REDIS_URL or AGORA_REDIS_URL must be set".to_string(),
                key: Some("AGORA_REDIS_URL".to_string()),
            })?;

        let connection_timeout_secs = parse_env_var("AGORA_REDIS_CONNECTION_TIMEOUT", 10u64)?;

        let response_timeout_secs = parse_env_var("AGORA_REDIS_RESPONSE_TIMEOUT", 5u64)?;

        Ok(Self {
            url,
            connection_timeout: Duration::from_secs(connection_timeout_secs),
            response_timeout: Duration::from_secs(response_timeout_secs),
        })
    }

    fn validate(&self) -> Result<(), AgoraError> {
        Url::parse(&self.url).map_err(|e| AgoraError::ConfigurationError {
            message: format!("Invalid REDIS_URL: {}", e),
            key: Some("AGORA_REDIS_URL".to_string()),
        })?;

        if self.connection_timeout.as_secs() == 0 {
            return Err(AgoraError::ConfigurationError {
                message: "connection_timeout must be greater than 0 seconds".to_string(),
                key: Some("AGORA_REDIS_CONNECTION_TIMEOUT".to_string()),
            });
        }

        if self.response_timeout.as_secs() == 0 {
            return Err(AgoraError::ConfigurationError {
                message: "response_timeout must be greater than 0 seconds".to_string(),
                key: Some("AGORA_REDIS_RESPONSE_TIMEOUT".to_string()),
            });
        }

        Ok(())
    }
}

/// Helper function to parse an environment variable with a default value
///
/// # Errors
///
/// Returns a `ConfigurationError` if the value is set but cannot be parsed.
fn parse_env_var<T>(key: &str, default: T) -> Result<T, AgoraError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .ok()
        .map(|v| {
            v.parse::<T>().map_err(|e| AgoraError::ConfigurationError {
                message: format!("Failed to parse {}: {}", key, e),
                key: Some(key.to_string()),
            })
        })
        .unwrap_or(Ok(default))
}

/// Load .env file if present
///
/// Does not return an error if the .env file is not found.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        // Only log if it's not a "file not found" error
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Helper to set environment variable for test
    fn set_test_env(key: &str, value: &str) {
        env::set_var(key, value);
    }

    /// Helper to remove environment variable after test
    fn clear_test_env(key: &str) {
        env::remove_var(key);
    }

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.idle_timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_database_config_from_env() {
        set_test_env("AGORA_DATABASE_URL", "postgresql://localhost/test");
        set_test_env("AGORA_DATABASE_MAX_CONNECTIONS", "50");
        set_test_env("AGORA_DATABASE_MIN_CONNECTIONS", "5");

        let config = DatabaseConfig::from_env().unwrap();
        assert_eq!(config.url, "postgresql://localhost/test");
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.min_connections, 5);

        clear_test_env("AGORA_DATABASE_MAX_CONNECTIONS");
        clear_test_env("AGORA_DATABASE_MIN_CONNECTIONS");

        // Bare DATABASE_URL works as fallback once the prefixed form is gone
        clear_test_env("AGORA_DATABASE_URL");
        set_test_env("DATABASE_URL", "postgresql://fallback/test");
        let config = DatabaseConfig::from_env().unwrap();
        assert_eq!(config.url, "postgresql://fallback/test");
        clear_test_env("DATABASE_URL");
    }

    #[test]
    fn test_database_config_validation_invalid_url() {
        let config = DatabaseConfig {
            url: "not-a-valid-url".to_string(),
            ..DatabaseConfig::default()
        };

        let result = config.validate();
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err(),
            AgoraError::ConfigurationError { .. }
        ));
    }

    #[test]
    fn test_database_config_validation_zero_max_connections() {
        let config = DatabaseConfig {
            max_connections: 0,
            ..DatabaseConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_config_validation_min_exceeds_max() {
        let config = DatabaseConfig {
            min_connections: 30,
            max_connections: 20,
            ..DatabaseConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redis_config_default() {
        let config = RedisConfig::default();
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert_eq!(config.response_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_redis_config_from_env() {
        set_test_env("AGORA_REDIS_URL", "redis://localhost:6379/1");

        let config = RedisConfig::from_env().unwrap();
        assert_eq!(config.url, "redis://localhost:6379/1");

        // Bare REDIS_URL works as fallback once the prefixed form is gone
        clear_test_env("AGORA_REDIS_URL");
        set_test_env("REDIS_URL", "redis://fallback:6379");
        let config = RedisConfig::from_env().unwrap();
        assert_eq!(config.url, "redis://fallback:6379");
        clear_test_env("REDIS_URL");
    }

    #[test]
    fn test_redis_config_validation_invalid_url() {
        let config = RedisConfig {
            url: "invalid-redis-url".to_string(),
            ..RedisConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_env_var_with_default() {
        let result: u32 = parse_env_var("NON_EXISTENT_VAR", 42).unwrap();
        assert_eq!(result, 42);
    }

    #[test]
    fn test_parse_env_var_with_value() {
        set_test_env("TEST_PARSE_VAR", "100");
        let result: u32 = parse_env_var("TEST_PARSE_VAR", 42).unwrap();
        assert_eq!(result, 100);
        clear_test_env("TEST_PARSE_VAR");
    }

    #[test]
    fn test_parse_env_var_invalid_value() {
        set_test_env("TEST_INVALID_VAR", "not-a-number");
        let result: Result<u32, _> = parse_env_var("TEST_INVALID_VAR", 42);
        assert!(result.is_err());
        clear_test_env("TEST_INVALID_VAR");
    }
}

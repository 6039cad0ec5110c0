//! Shared error taxonomy for Agora services
//!
//! A single error enum covers the platform-level failure classes; per-module
//! errors (queue, events) live next to the code that raises them and convert
//! into these variants at service boundaries when needed.

use thiserror::Error;

/// Platform-wide error type
#[derive(Debug, Error)]
pub enum AgoraError {
    /// Configuration loading or validation failure
    #[error("Configuration error: {message}")]
    ConfigurationError {
        message: String,
        /// The environment variable or config key involved, if known
        key: Option<String>,
    },

    /// Input failed validation
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        /// The field that failed validation, if known
        field: Option<String>,
    },

    /// Database operation failure
    #[error("Database error: {message}")]
    DatabaseError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Network or remote service failure
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// JSON serialization or deserialization failure
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AgoraError {
    /// Whether the error class is transient and worth retrying
    ///
    /// Database and network failures are considered transient; configuration,
    /// validation, and serialization failures will not succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgoraError::DatabaseError { .. } | AgoraError::NetworkError { .. }
        )
    }

    /// Shorthand for a database error wrapping an underlying cause
    pub fn database<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AgoraError::DatabaseError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let db = AgoraError::DatabaseError {
            message: "connection reset".to_string(),
            source: None,
        };
        let net = AgoraError::NetworkError {
            message: "timeout".to_string(),
            source: None,
        };
        let config = AgoraError::ConfigurationError {
            message: "missing".to_string(),
            key: None,
        };
        let validation = AgoraError::ValidationError {
            message: "bad input".to_string(),
            field: Some("user_id".to_string()),
        };

        assert!(db.is_retryable());
        assert!(net.is_retryable());
        assert!(!config.is_retryable());
        assert!(!validation.is_retryable());
    }

    #[test]
    fn test_display_includes_message() {
        let err = AgoraError::ConfigurationError {
            message: "DATABASE_URL must be set".to_string(),
            key: Some("AGORA_DATABASE_URL".to_string()),
        };
        assert!(err.to_string().contains("DATABASE_URL must be set"));
    }

    #[test]
    fn test_serialization_error_from() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: AgoraError = json_err.into();
        assert!(matches!(err, AgoraError::SerializationError(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_database_shorthand_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = AgoraError::database("pool checkout failed", io);
        assert!(err.is_retryable());
        assert!(std::error::Error::source(&err).is_some());
    }
}

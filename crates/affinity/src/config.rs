use agora_core::{ActionKind, AgoraError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Affinity Service Configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AffinityConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Action queue configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// Kafka producer configuration
    #[serde(default)]
    pub kafka: KafkaConfig,

    /// Action weight table
    #[serde(default)]
    pub weights: WeightsConfig,

    /// Scoring and query configuration
    #[serde(default)]
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,

    /// Server port (default: 8084)
    pub port: u16,

    /// Worker threads
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Redis stream key for incoming actions
    pub stream_key: String,

    /// Redis stream key for the dead letter queue
    pub dlq_key: String,

    /// Consumer group name
    pub consumer_group: String,

    /// Number of worker tasks consuming the stream
    pub consumers: usize,

    /// Sleep between polls when the stream is empty (milliseconds)
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    /// Whether outbound event publishing is enabled
    pub enabled: bool,

    /// Comma-separated list of Kafka broker addresses
    pub brokers: String,

    /// Topic prefix for all events
    pub topic_prefix: String,

    /// Message timeout in milliseconds
    pub message_timeout_ms: u64,
}

impl KafkaConfig {
    /// Gets the full topic name for an event type
    pub fn topic_for_event(&self, event_type: &str) -> String {
        format!("{}.{}", self.topic_prefix, event_type)
    }
}

/// Static action weight table
///
/// One weight per action kind, fixed for the process lifetime. A user's
/// stored weight for an event is the maximum weight over all their actions
/// on it, so these values decide which actions outrank which.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WeightsConfig {
    /// Weight for viewing an event listing (default: 0.3)
    pub view: f64,

    /// Weight for commenting (default: 0.4)
    pub comment: f64,

    /// Weight for bookmarking (default: 0.5)
    pub bookmark: f64,

    /// Weight for registering to participate (default: 0.8)
    pub register: f64,

    /// Weight for liking (default: 1.0)
    pub like: f64,
}

impl WeightsConfig {
    /// Resolve the configured weight for an action kind
    pub fn weight_for(&self, kind: ActionKind) -> f64 {
        match kind {
            ActionKind::View => self.view,
            ActionKind::Comment => self.comment,
            ActionKind::Bookmark => self.bookmark,
            ActionKind::Register => self.register,
            ActionKind::Like => self.like,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringConfig {
    /// Recent interactions used to seed predictions (default: 10)
    pub recent_events_limit: usize,

    /// Similar events fetched per candidate when predicting (default: 25)
    pub neighbor_limit: usize,

    /// Default result count for query endpoints (default: 20)
    pub default_max_results: usize,

    /// Default query timeout in milliseconds (default: 2000)
    pub default_query_timeout_ms: u64,

    /// Upper bound for caller-supplied query timeouts (default: 10000)
    pub max_query_timeout_ms: u64,
}

impl ScoringConfig {
    /// Resolve a caller-supplied timeout, clamped to the configured maximum
    pub fn query_timeout(&self, requested_ms: Option<u64>) -> Duration {
        let ms = requested_ms
            .unwrap_or(self.default_query_timeout_ms)
            .min(self.max_query_timeout_ms);
        Duration::from_millis(ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8084,
            workers: None,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            stream_key: "actions:incoming".to_string(),
            dlq_key: "actions:dlq".to_string(),
            consumer_group: "affinity-engine".to_string(),
            consumers: 2,
            poll_interval_ms: 100,
        }
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            brokers: "localhost:9092".to_string(),
            topic_prefix: "agora".to_string(),
            message_timeout_ms: 5000,
        }
    }
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            view: 0.3,
            comment: 0.4,
            bookmark: 0.5,
            register: 0.8,
            like: 1.0,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            recent_events_limit: 10,
            neighbor_limit: 25,
            default_max_results: 20,
            default_query_timeout_ms: 2000,
            max_query_timeout_ms: 10000,
        }
    }
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            queue: QueueConfig::default(),
            kafka: KafkaConfig::default(),
            weights: WeightsConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl AffinityConfig {
    /// Load configuration from environment and config file
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/affinity").required(false))
            .add_source(config::Environment::with_prefix("AFFINITY").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> agora_core::Result<()> {
        for kind in ActionKind::ALL {
            let weight = self.weights.weight_for(kind);
            if !weight.is_finite() || weight <= 0.0 {
                return Err(AgoraError::ConfigurationError {
                    message: format!(
                        "action weight for '{}' must be positive and finite, got {}",
                        kind.as_str(),
                        weight
                    ),
                    key: Some(format!("weights.{}", kind.as_str())),
                });
            }
        }

        if self.queue.stream_key.is_empty()
            || self.queue.dlq_key.is_empty()
            || self.queue.consumer_group.is_empty()
        {
            return Err(AgoraError::ConfigurationError {
                message: "queue stream key, dlq key and consumer group must be set".to_string(),
                key: Some("queue".to_string()),
            });
        }

        if self.queue.consumers == 0 {
            return Err(AgoraError::ConfigurationError {
                message: "at least one queue consumer is required".to_string(),
                key: Some("queue.consumers".to_string()),
            });
        }

        if self.kafka.enabled && self.kafka.brokers.is_empty() {
            return Err(AgoraError::ConfigurationError {
                message: "kafka brokers must be set when publishing is enabled".to_string(),
                key: Some("kafka.brokers".to_string()),
            });
        }

        if self.scoring.recent_events_limit == 0
            || self.scoring.neighbor_limit == 0
            || self.scoring.default_max_results == 0
        {
            return Err(AgoraError::ConfigurationError {
                message: "scoring limits must be at least 1".to_string(),
                key: Some("scoring".to_string()),
            });
        }

        if self.scoring.default_query_timeout_ms == 0
            || self.scoring.default_query_timeout_ms > self.scoring.max_query_timeout_ms
        {
            return Err(AgoraError::ConfigurationError {
                message: format!(
                    "default query timeout must be between 1 and {} ms",
                    self.scoring.max_query_timeout_ms
                ),
                key: Some("scoring.default_query_timeout_ms".to_string()),
            });
        }

        Ok(())
    }

    /// Get the empty-queue poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AffinityConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8084);
        assert_eq!(config.queue.stream_key, "actions:incoming");
        assert_eq!(config.queue.consumer_group, "affinity-engine");
    }

    #[test]
    fn test_default_weights_are_ordered() {
        let weights = WeightsConfig::default();
        assert!(weights.view < weights.comment);
        assert!(weights.comment < weights.bookmark);
        assert!(weights.bookmark < weights.register);
        assert!(weights.register < weights.like);
    }

    #[test]
    fn test_weight_for_maps_every_kind() {
        let weights = WeightsConfig::default();
        assert_eq!(weights.weight_for(ActionKind::View), 0.3);
        assert_eq!(weights.weight_for(ActionKind::Comment), 0.4);
        assert_eq!(weights.weight_for(ActionKind::Bookmark), 0.5);
        assert_eq!(weights.weight_for(ActionKind::Register), 0.8);
        assert_eq!(weights.weight_for(ActionKind::Like), 1.0);
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let mut config = AffinityConfig::default();
        config.weights.view = 0.0;
        assert!(config.validate().is_err());

        config.weights.view = -0.3;
        assert!(config.validate().is_err());

        config.weights.view = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_consumers() {
        let mut config = AffinityConfig::default();
        config.queue.consumers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_timeout_above_max() {
        let mut config = AffinityConfig::default();
        config.scoring.default_query_timeout_ms = 20000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_query_timeout_clamps_to_max() {
        let scoring = ScoringConfig::default();

        assert_eq!(scoring.query_timeout(None), Duration::from_millis(2000));
        assert_eq!(
            scoring.query_timeout(Some(500)),
            Duration::from_millis(500)
        );
        assert_eq!(
            scoring.query_timeout(Some(60000)),
            Duration::from_millis(10000)
        );
    }

    #[test]
    fn test_topic_naming() {
        let kafka = KafkaConfig::default();
        assert_eq!(
            kafka.topic_for_event("similarity.updated"),
            "agora.similarity.updated"
        );
    }
}

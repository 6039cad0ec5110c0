//! Kafka Event Streaming for Affinity Updates
//!
//! This module publishes the engine's output for downstream consumers:
//! refreshed pair similarities and upserted user interactions. Delivery is
//! best-effort; the persisted rows never depend on Kafka accepting a message.

use crate::config::KafkaConfig;
use agora_core::health::{ComponentHealth, HealthCheck};
use chrono::{DateTime, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Event streaming errors
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Failed to publish event: {0}")]
    PublishFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type EventResult<T> = Result<T, EventError>;

/// Base event structure shared across all event types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseEvent {
    /// Type of the event (e.g., "similarity.updated")
    pub event_type: String,

    /// Timestamp the update was derived (ISO8601 format)
    pub timestamp: DateTime<Utc>,

    /// Correlation ID for distributed tracing
    pub correlation_id: Uuid,
}

impl BaseEvent {
    /// Creates a new base event with the given type
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Sets the correlation ID for tracing
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

/// Similarity update event - fired when a pair's score is recomputed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityUpdatedEvent {
    #[serde(flatten)]
    pub base: BaseEvent,

    /// Smaller event id of the pair
    pub event_a_id: i64,

    /// Larger event id of the pair
    pub event_b_id: i64,

    /// Similarity score in [0, 1]
    pub score: f64,
}

impl SimilarityUpdatedEvent {
    /// Creates a new similarity updated event
    ///
    /// The pair is stored canonically regardless of argument order.
    pub fn new(event_x_id: i64, event_y_id: i64, score: f64) -> Self {
        Self {
            base: BaseEvent::new("similarity.updated"),
            event_a_id: event_x_id.min(event_y_id),
            event_b_id: event_x_id.max(event_y_id),
            score,
        }
    }

    /// Sets the timestamp the score was derived
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.base.timestamp = timestamp;
        self
    }
}

/// Interaction upsert event - fired when a user's weight for an event rises
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionUpsertedEvent {
    #[serde(flatten)]
    pub base: BaseEvent,

    pub user_id: i64,

    pub event_id: i64,

    /// New stored weight (the user's strongest action so far)
    pub weight: f64,
}

impl InteractionUpsertedEvent {
    /// Creates a new interaction upserted event
    pub fn new(user_id: i64, event_id: i64, weight: f64) -> Self {
        Self {
            base: BaseEvent::new("interaction.upserted"),
            user_id,
            event_id,
            weight,
        }
    }

    /// Sets the timestamp the interaction was observed
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.base.timestamp = timestamp;
        self
    }
}

/// Event payload enum for type-safe event publishing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AffinityEvent {
    SimilarityUpdated(SimilarityUpdatedEvent),
    InteractionUpserted(InteractionUpsertedEvent),
}

impl AffinityEvent {
    /// Gets the event type string
    pub fn event_type(&self) -> &str {
        match self {
            AffinityEvent::SimilarityUpdated(e) => &e.base.event_type,
            AffinityEvent::InteractionUpserted(e) => &e.base.event_type,
        }
    }

    /// Gets the correlation ID for tracing
    pub fn correlation_id(&self) -> Uuid {
        match self {
            AffinityEvent::SimilarityUpdated(e) => e.base.correlation_id,
            AffinityEvent::InteractionUpserted(e) => e.base.correlation_id,
        }
    }

    /// Gets the Kafka partition key
    ///
    /// Similarity updates key on the canonical pair so one pair's updates
    /// stay ordered within a partition; interactions key on (user, event).
    pub fn partition_key(&self) -> String {
        match self {
            AffinityEvent::SimilarityUpdated(e) => {
                format!("{}:{}", e.event_a_id, e.event_b_id)
            }
            AffinityEvent::InteractionUpserted(e) => {
                format!("{}:{}", e.user_id, e.event_id)
            }
        }
    }
}

/// Trait for affinity event producer implementations
#[async_trait::async_trait]
pub trait AffinityEventProducer: Send + Sync {
    /// Publishes an event to the event stream
    async fn publish(&self, event: AffinityEvent) -> EventResult<()>;

    /// Publishes multiple events in a batch
    async fn publish_batch(&self, events: Vec<AffinityEvent>) -> EventResult<()>;

    /// Health check
    async fn is_healthy(&self) -> bool;
}

/// Kafka producer for affinity events
#[derive(Clone)]
pub struct KafkaEventProducer {
    producer: FutureProducer,
    config: KafkaConfig,
}

impl KafkaEventProducer {
    /// Create a new Kafka event producer
    pub fn new(config: KafkaConfig) -> EventResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .set("queue.buffering.max.messages", "100000")
            .set("queue.buffering.max.kbytes", "1048576")
            .set("batch.num.messages", "10000")
            .set("linger.ms", "10")
            .set("compression.type", "snappy")
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| EventError::ConfigError(e.to_string()))?;

        info!(
            brokers = %config.brokers,
            topic_prefix = %config.topic_prefix,
            "Initialized Kafka affinity event producer"
        );

        Ok(Self { producer, config })
    }

    /// Publish an event to Kafka
    async fn publish_to_kafka(&self, event: &AffinityEvent) -> EventResult<()> {
        let topic = self.config.topic_for_event(event.event_type());
        let payload = serde_json::to_vec(event)?;
        let key = event.partition_key();

        let record = FutureRecord::to(&topic).key(&key).payload(&payload);

        self.producer
            .send(
                record,
                Duration::from_millis(self.config.message_timeout_ms),
            )
            .await
            .map_err(|(err, _)| EventError::PublishFailed(err.to_string()))?;

        debug!(
            event_type = %event.event_type(),
            correlation_id = %event.correlation_id(),
            topic = %topic,
            key = %key,
            "Published affinity event"
        );

        Ok(())
    }
}

#[async_trait::async_trait]
impl AffinityEventProducer for KafkaEventProducer {
    async fn publish(&self, event: AffinityEvent) -> EventResult<()> {
        self.publish_to_kafka(&event).await
    }

    async fn publish_batch(&self, events: Vec<AffinityEvent>) -> EventResult<()> {
        let mut failed = 0usize;

        for event in events {
            if let Err(e) = self.publish_to_kafka(&event).await {
                error!(
                    event_type = %event.event_type(),
                    error = %e,
                    "Failed to publish event in batch"
                );
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(EventError::PublishFailed(format!(
                "{} events failed to publish",
                failed
            )));
        }

        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        // The producer buffers internally; treat an initialized producer as
        // healthy and let publish errors surface per message.
        true
    }
}

/// Mock event producer for testing
pub struct MockEventProducer {
    published_events: Arc<tokio::sync::Mutex<Vec<AffinityEvent>>>,
    fail_publishes: bool,
}

impl MockEventProducer {
    /// Creates a new mock event producer
    pub fn new() -> Self {
        Self {
            published_events: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            fail_publishes: false,
        }
    }

    /// Creates a mock producer whose publishes always fail
    pub fn failing() -> Self {
        Self {
            published_events: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            fail_publishes: true,
        }
    }

    /// Gets all published events (for testing)
    pub async fn get_published_events(&self) -> Vec<AffinityEvent> {
        self.published_events.lock().await.clone()
    }

    /// Clears all published events (for testing)
    pub async fn clear_events(&self) {
        self.published_events.lock().await.clear();
    }
}

impl Default for MockEventProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AffinityEventProducer for MockEventProducer {
    async fn publish(&self, event: AffinityEvent) -> EventResult<()> {
        if self.fail_publishes {
            return Err(EventError::PublishFailed("mock failure".to_string()));
        }

        // Simulate serialization
        let _payload = serde_json::to_string(&event)?;

        self.published_events.lock().await.push(event);
        Ok(())
    }

    async fn publish_batch(&self, events: Vec<AffinityEvent>) -> EventResult<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        !self.fail_publishes
    }
}

/// Health check backed by the event producer
pub struct ProducerHealthCheck {
    producer: Arc<dyn AffinityEventProducer>,
    name: String,
}

impl ProducerHealthCheck {
    pub fn new(producer: Arc<dyn AffinityEventProducer>) -> Self {
        Self {
            producer,
            name: "kafka".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl HealthCheck for ProducerHealthCheck {
    async fn check(&self) -> ComponentHealth {
        let start = Instant::now();
        let healthy = self.producer.is_healthy().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        if healthy {
            ComponentHealth::healthy(&self.name, latency_ms, false)
        } else {
            ComponentHealth::unhealthy(&self.name, latency_ms, false, "Producer reports unhealthy")
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_critical(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_event_creation() {
        let event = BaseEvent::new("similarity.updated");

        assert_eq!(event.event_type, "similarity.updated");
        assert!(event.correlation_id != Uuid::nil());
    }

    #[test]
    fn test_similarity_event_is_canonical() {
        let event = SimilarityUpdatedEvent::new(200, 100, 0.5);

        assert_eq!(event.event_a_id, 100);
        assert_eq!(event.event_b_id, 200);
        assert_eq!(event.score, 0.5);
    }

    #[test]
    fn test_partition_keys() {
        let sim = AffinityEvent::SimilarityUpdated(SimilarityUpdatedEvent::new(200, 100, 0.5));
        assert_eq!(sim.partition_key(), "100:200");

        let interaction =
            AffinityEvent::InteractionUpserted(InteractionUpsertedEvent::new(42, 7, 1.0));
        assert_eq!(interaction.partition_key(), "42:7");
    }

    #[test]
    fn test_tagged_serialization() {
        let event = AffinityEvent::SimilarityUpdated(SimilarityUpdatedEvent::new(100, 200, 0.5));

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"similarity_updated\""));
        assert!(json.contains("\"event_type\":\"similarity.updated\""));

        let deserialized: AffinityEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.event_type(), "similarity.updated");
    }

    #[test]
    fn test_with_timestamp_overrides_base() {
        let derived_at = Utc::now() - chrono::Duration::minutes(5);
        let event = SimilarityUpdatedEvent::new(100, 200, 0.5).with_timestamp(derived_at);

        assert_eq!(event.base.timestamp, derived_at);
    }

    #[tokio::test]
    async fn test_mock_producer_records_events() {
        let producer = MockEventProducer::new();

        producer
            .publish(AffinityEvent::SimilarityUpdated(
                SimilarityUpdatedEvent::new(100, 200, 0.5),
            ))
            .await
            .unwrap();

        let published = producer.get_published_events().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].event_type(), "similarity.updated");
        assert!(producer.is_healthy().await);
    }

    #[tokio::test]
    async fn test_failing_mock_producer() {
        let producer = MockEventProducer::failing();

        let result = producer
            .publish(AffinityEvent::InteractionUpserted(
                InteractionUpsertedEvent::new(42, 7, 1.0),
            ))
            .await;

        assert!(matches!(result, Err(EventError::PublishFailed(_))));
        assert!(producer.get_published_events().await.is_empty());
        assert!(!producer.is_healthy().await);
    }

    #[tokio::test]
    async fn test_producer_health_check() {
        let healthy = ProducerHealthCheck::new(Arc::new(MockEventProducer::new()));
        let result = healthy.check().await;
        assert_eq!(result.name, "kafka");
        assert!(!result.critical);
        assert_eq!(result.status, agora_core::HealthStatus::Healthy);

        let unhealthy = ProducerHealthCheck::new(Arc::new(MockEventProducer::failing()));
        let result = unhealthy.check().await;
        assert_eq!(result.status, agora_core::HealthStatus::Unhealthy);
    }
}

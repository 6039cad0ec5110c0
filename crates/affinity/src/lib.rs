//! Agora Affinity Service
//!
//! Turns the platform's stream of user actions into event-to-event
//! similarity scores and serves recommendations computed from them. One
//! pipeline runs end to end: actions arrive on a Redis Stream, the update
//! engine folds each into incremental aggregates, and the resulting
//! interaction and similarity rows are persisted to PostgreSQL and
//! published to Kafka. A separate read path scores recommendation queries
//! against the persisted rows.

pub mod config;
pub mod engine;
pub mod events;
pub mod locks;
pub mod memory;
pub mod queue;
pub mod repository;
pub mod scorer;
pub mod server;
pub mod store;
pub mod worker;

// Re-export key types
pub use config::{
    AffinityConfig, KafkaConfig, QueueConfig, ScoringConfig, ServerConfig, WeightsConfig,
};
pub use engine::{ActionOutcome, ActionUpdates, InteractionUpdate, SimilarityEngine, SimilarityUpdate};
pub use events::{
    AffinityEvent, AffinityEventProducer, InteractionUpsertedEvent, KafkaEventProducer,
    MockEventProducer, ProducerHealthCheck, SimilarityUpdatedEvent,
};
pub use memory::InMemoryAffinityRepository;
pub use queue::{ActionQueue, InMemoryActionQueue, QueueStats, RedisActionQueue};
pub use repository::{AffinityRepository, PostgresAffinityRepository, ScoredEvent};
pub use scorer::RecommendationScorer;
pub use store::WeightStore;
pub use worker::ActionWorker;

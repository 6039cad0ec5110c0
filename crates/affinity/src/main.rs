//! Affinity Service - Event Similarity and Recommendation Scoring
//!
//! Port: 8084
//! Consumes user actions, maintains incremental event-to-event similarity
//! scores and serves recommendation queries over the persisted aggregates.

use std::sync::Arc;

use agora_affinity::config::AffinityConfig;
use agora_affinity::engine::SimilarityEngine;
use agora_affinity::events::{AffinityEventProducer, KafkaEventProducer, ProducerHealthCheck};
use agora_affinity::queue::{ActionQueue, RedisActionQueue};
use agora_affinity::repository::PostgresAffinityRepository;
use agora_affinity::scorer::RecommendationScorer;
use agora_affinity::server::{start_server, ServerState};
use agora_affinity::store::WeightStore;
use agora_affinity::worker::ActionWorker;
use agora_core::health::HealthChecker;
use agora_core::{load_dotenv, ConfigLoader, DatabaseConfig, DatabasePool, RedisConfig};
use tracing::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .json()
        .init();

    info!("Starting Agora Affinity Service");

    let config = AffinityConfig::load()?;
    config.validate()?;

    let db_config = DatabaseConfig::from_env()?;
    db_config.validate()?;
    let db_pool = DatabasePool::new(&db_config).await?;

    let redis_config = RedisConfig::from_env()?;
    redis_config.validate()?;

    let queue: Arc<dyn ActionQueue> =
        Arc::new(RedisActionQueue::new(&redis_config.url, &config.queue)?);

    let repository = Arc::new(PostgresAffinityRepository::new(db_pool.pool().clone()));

    // In-memory aggregates start empty; similarity is computed from this
    // point forward.
    let store = Arc::new(WeightStore::new());
    let engine = Arc::new(SimilarityEngine::new(config.weights.clone(), store));

    let producer: Option<Arc<dyn AffinityEventProducer>> = if config.kafka.enabled {
        info!(brokers = %config.kafka.brokers, "Kafka event publishing enabled");
        Some(Arc::new(KafkaEventProducer::new(config.kafka.clone())?))
    } else {
        info!("Kafka event publishing disabled");
        None
    };

    let mut health_checker = HealthChecker::new()
        .with_postgres(db_pool.pool().clone())
        .with_redis(redis::Client::open(redis_config.url.as_str())?);
    if let Some(producer) = &producer {
        health_checker = health_checker.add_check(ProducerHealthCheck::new(producer.clone()));
    }

    let worker = ActionWorker::new(
        queue.clone(),
        engine.clone(),
        repository.clone(),
        producer,
        config.poll_interval(),
    );

    let mut worker_handles = Vec::with_capacity(config.queue.consumers);
    for i in 0..config.queue.consumers {
        let worker = worker.clone();
        let consumer_name = format!("affinity-worker-{}", i);
        worker_handles.push(tokio::spawn(async move {
            worker.run(&consumer_name).await;
        }));
    }
    info!(consumers = config.queue.consumers, "Action workers started");

    let state = ServerState {
        scorer: Arc::new(RecommendationScorer::new(
            repository,
            config.scoring.clone(),
        )),
        queue,
        engine,
        health_checker: Arc::new(health_checker),
        scoring: config.scoring.clone(),
    };

    let result = start_server(state, &config.server).await;

    for handle in worker_handles {
        handle.abort();
    }

    result?;
    Ok(())
}

//! End-to-end flow from queued actions to served predictions
//!
//! Runs the real pipeline with in-memory transport and persistence: actions
//! are enqueued, a worker drains them through the engine into the
//! repository, and the scorer answers queries from what was persisted.

use agora_affinity::config::{ScoringConfig, WeightsConfig};
use agora_affinity::engine::SimilarityEngine;
use agora_affinity::events::MockEventProducer;
use agora_affinity::memory::InMemoryAffinityRepository;
use agora_affinity::queue::{ActionQueue, InMemoryActionQueue};
use agora_affinity::repository::AffinityRepository;
use agora_affinity::scorer::RecommendationScorer;
use agora_affinity::store::WeightStore;
use agora_affinity::worker::ActionWorker;
use agora_core::{ActionKind, UserActionEvent};
use std::sync::Arc;
use std::time::Duration;

struct Pipeline {
    queue: Arc<InMemoryActionQueue>,
    repository: Arc<InMemoryAffinityRepository>,
    producer: Arc<MockEventProducer>,
    worker: ActionWorker,
    scorer: RecommendationScorer,
}

fn pipeline() -> Pipeline {
    let queue = Arc::new(InMemoryActionQueue::new());
    let repository = Arc::new(InMemoryAffinityRepository::new());
    let producer = Arc::new(MockEventProducer::new());

    let engine = Arc::new(SimilarityEngine::new(
        WeightsConfig::default(),
        Arc::new(WeightStore::new()),
    ));

    let worker = ActionWorker::new(
        queue.clone(),
        engine,
        repository.clone(),
        Some(producer.clone()),
        Duration::from_millis(10),
    );

    let scorer = RecommendationScorer::new(repository.clone(), ScoringConfig::default());

    Pipeline {
        queue,
        repository,
        producer,
        worker,
        scorer,
    }
}

impl Pipeline {
    async fn submit(&self, user_id: i64, event_id: i64, kind: ActionKind) {
        self.queue
            .enqueue(UserActionEvent::new(user_id, event_id, kind))
            .await
            .unwrap();
    }

    async fn drain(&self) {
        while self.worker.process_next("flow-worker").await.unwrap() {}
    }
}

/// Three users with overlapping histories across events 100, 200, 300.
async fn seed_interactions(p: &Pipeline) {
    p.submit(1, 100, ActionKind::Like).await;
    p.submit(1, 200, ActionKind::Bookmark).await;
    p.submit(2, 100, ActionKind::Like).await;
    p.submit(2, 300, ActionKind::Like).await;
    p.submit(3, 200, ActionKind::Like).await;
    p.submit(3, 300, ActionKind::Like).await;
    p.drain().await;
}

#[tokio::test]
async fn test_actions_flow_into_persisted_similarities() {
    let p = pipeline();
    seed_interactions(&p).await;

    // All three pairs got linked through shared users.
    assert_eq!(p.repository.similarity_count().await, 3);
    assert!(p.repository.similarity_score(100, 200).await.is_some());
    assert!(p.repository.similarity_score(100, 300).await.is_some());
    assert!(p.repository.similarity_score(200, 300).await.is_some());

    // Six applied actions published six interactions plus three pair scores.
    assert_eq!(p.producer.get_published_events().await.len(), 9);

    let stats = p.queue.stats().await.unwrap();
    assert_eq!(stats.pending_count, 0);
    assert_eq!(stats.total_processed, 6);
}

#[tokio::test]
async fn test_similar_events_lookup_excludes_history() {
    let p = pipeline();
    seed_interactions(&p).await;

    // User 1 already interacted with 200, so only 300 remains.
    let similar = p.scorer.find_similar_events(100, 1, 10).await.unwrap();
    let ids: Vec<i64> = similar.iter().map(|s| s.event_id).collect();
    assert_eq!(ids, vec![300]);

    // A user with no history sees both counterparts of event 100.
    let similar = p.scorer.find_similar_events(100, 999, 10).await.unwrap();
    let mut ids: Vec<i64> = similar.iter().map(|s| s.event_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![200, 300]);
}

#[tokio::test]
async fn test_predictions_are_weighted_by_user_history() {
    let p = pipeline();
    seed_interactions(&p).await;

    // For user 1 the only candidate is 300, reachable from both of the
    // user's events.
    let predictions = p.scorer.user_predictions(1, 10).await.unwrap();
    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0].event_id, 300);

    // Weighted average over the user's own weights (1.0 on 100, 0.5 on 200).
    let sim_100_300 = p.repository.similarity_score(100, 300).await.unwrap();
    let sim_200_300 = p.repository.similarity_score(200, 300).await.unwrap();
    let expected =
        (sim_100_300 * 1.0 + sim_200_300 * 0.5) / (sim_100_300 + sim_200_300);
    assert!((predictions[0].score - expected).abs() < 1e-9);

    // The prediction is for something the user has not interacted with.
    let history = p.repository.interacted_events(1).await.unwrap();
    assert!(!history.contains(&300));
}

#[tokio::test]
async fn test_predictions_empty_for_new_user() {
    let p = pipeline();
    seed_interactions(&p).await;

    let predictions = p.scorer.user_predictions(999, 10).await.unwrap();
    assert!(predictions.is_empty());
}

#[tokio::test]
async fn test_interaction_counts_aggregate_across_users() {
    let p = pipeline();
    seed_interactions(&p).await;

    let counts = p
        .scorer
        .interactions_count(&[100, 200, 300, 404])
        .await
        .unwrap();

    assert_eq!(counts.len(), 4);
    assert!((counts[0].score - 2.0).abs() < 1e-12); // likes from users 1 and 2
    assert!((counts[1].score - 1.5).abs() < 1e-12); // bookmark + like
    assert!((counts[2].score - 2.0).abs() < 1e-12); // likes from users 2 and 3
    assert_eq!(counts[3].score, 0.0);
}

#[tokio::test]
async fn test_redelivered_action_changes_nothing() {
    let p = pipeline();
    seed_interactions(&p).await;

    let before_events = p.producer.get_published_events().await.len();
    let score_before = p.repository.similarity_score(100, 200).await.unwrap();

    // The same logical action arrives again; it cannot raise the weight.
    p.submit(1, 200, ActionKind::Bookmark).await;
    p.drain().await;

    assert_eq!(p.producer.get_published_events().await.len(), before_events);
    let score_after = p.repository.similarity_score(100, 200).await.unwrap();
    assert_eq!(score_before, score_after);
    assert_eq!(p.queue.stats().await.unwrap().total_processed, 7);
}

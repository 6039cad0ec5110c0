//! Action processing worker
//!
//! Pulls actions off the queue, runs them through the similarity engine,
//! persists what changed and publishes the same updates downstream. Each
//! worker is one consumer in the queue's consumer group; several run in
//! parallel and the engine's per-user locking keeps them consistent.

use std::sync::Arc;
use std::time::Duration;

use agora_core::retry::{retry_with_backoff, RetryPolicy};
use agora_core::UserActionEvent;
use tracing::{debug, error, info, warn};

use crate::engine::{ActionOutcome, ActionUpdates, SimilarityEngine};
use crate::events::{
    AffinityEvent, AffinityEventProducer, InteractionUpsertedEvent, SimilarityUpdatedEvent,
};
use crate::queue::{ActionQueue, DeadLetteredAction, QueueResult};
use crate::repository::AffinityRepository;

/// Worker that drains the action queue into the engine and persistence
#[derive(Clone)]
pub struct ActionWorker {
    queue: Arc<dyn ActionQueue>,
    engine: Arc<SimilarityEngine>,
    repository: Arc<dyn AffinityRepository>,
    producer: Option<Arc<dyn AffinityEventProducer>>,
    retry_policy: RetryPolicy,
    poll_interval: Duration,
}

impl ActionWorker {
    pub fn new(
        queue: Arc<dyn ActionQueue>,
        engine: Arc<SimilarityEngine>,
        repository: Arc<dyn AffinityRepository>,
        producer: Option<Arc<dyn AffinityEventProducer>>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            engine,
            repository,
            producer,
            retry_policy: RetryPolicy::default(),
            poll_interval,
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Consume the queue until the task is aborted
    pub async fn run(&self, consumer_name: &str) {
        info!(consumer = consumer_name, "Action worker started");

        loop {
            match self.queue.dequeue(consumer_name).await {
                Ok(Some((message_id, action))) => {
                    self.handle_message(&message_id, &action).await;
                }
                Ok(None) => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => {
                    error!(consumer = consumer_name, error = %e, "Failed to dequeue action");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Process at most one queued action, returning whether one was found
    ///
    /// Used by tests and manual draining; `run` is the production loop.
    pub async fn process_next(&self, consumer_name: &str) -> QueueResult<bool> {
        match self.queue.dequeue(consumer_name).await? {
            Some((message_id, action)) => {
                self.handle_message(&message_id, &action).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn handle_message(&self, message_id: &str, action: &UserActionEvent) {
        if let Err(e) = action.validate() {
            warn!(
                message_id = %message_id,
                user_id = action.user_id,
                event_id = action.event_id,
                error = %e,
                "Discarding invalid action"
            );
            self.discard(message_id, action, &e.to_string()).await;
            return;
        }

        match self.engine.process_action(action).await {
            ActionOutcome::Applied(updates) => {
                if let Err(e) = self.persist_updates(&updates).await {
                    error!(
                        message_id = %message_id,
                        user_id = action.user_id,
                        event_id = action.event_id,
                        error = %e,
                        "Failed to persist action updates, moving to dead letter queue"
                    );
                    self.discard(message_id, action, &format!("persist failed: {}", e))
                        .await;
                    return;
                }

                self.publish_updates(&updates).await;
                self.ack_message(message_id).await;
            }
            ActionOutcome::Unchanged { current_weight } => {
                debug!(
                    message_id = %message_id,
                    user_id = action.user_id,
                    event_id = action.event_id,
                    current_weight = current_weight,
                    "Action did not raise the stored weight"
                );
                self.ack_message(message_id).await;
            }
        }
    }

    async fn persist_updates(&self, updates: &ActionUpdates) -> anyhow::Result<()> {
        retry_with_backoff(
            || async { self.repository.upsert_interaction(&updates.interaction).await },
            self.retry_policy.clone(),
            |_: &anyhow::Error| true,
        )
        .await?;

        for similarity in &updates.similarities {
            retry_with_backoff(
                || async { self.repository.upsert_similarity(similarity).await },
                self.retry_policy.clone(),
                |_: &anyhow::Error| true,
            )
            .await?;
        }

        Ok(())
    }

    async fn publish_updates(&self, updates: &ActionUpdates) {
        let producer = match &self.producer {
            Some(producer) => producer,
            None => return,
        };

        let mut events = Vec::with_capacity(updates.similarities.len() + 1);
        events.push(AffinityEvent::InteractionUpserted(
            InteractionUpsertedEvent::new(
                updates.interaction.user_id,
                updates.interaction.event_id,
                updates.interaction.weight,
            )
            .with_timestamp(updates.interaction.updated_at),
        ));
        for similarity in &updates.similarities {
            events.push(AffinityEvent::SimilarityUpdated(
                SimilarityUpdatedEvent::new(
                    similarity.event_a_id,
                    similarity.event_b_id,
                    similarity.score,
                )
                .with_timestamp(similarity.updated_at),
            ));
        }

        // Non-fatal: the next action touching the same pair re-emits.
        let count = events.len();
        if let Err(e) = producer.publish_batch(events).await {
            warn!(error = %e, count = count, "Failed to publish affinity events");
        }
    }

    async fn discard(&self, message_id: &str, action: &UserActionEvent, reason: &str) {
        match DeadLetteredAction::from_action(action, reason) {
            Ok(dead) => {
                if let Err(e) = self.queue.dead_letter(dead).await {
                    error!(message_id = %message_id, error = %e, "Failed to dead letter action");
                }
            }
            Err(e) => {
                error!(message_id = %message_id, error = %e, "Failed to encode dead letter payload");
            }
        }

        self.ack_message(message_id).await;
    }

    async fn ack_message(&self, message_id: &str) {
        if let Err(e) = self.queue.ack(message_id).await {
            warn!(message_id = %message_id, error = %e, "Failed to ack message");
        }
    }
}

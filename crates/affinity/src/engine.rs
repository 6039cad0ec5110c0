//! Similarity Update Engine
//!
//! Turns one user action into incremental aggregate updates and refreshed
//! similarity scores. The similarity between two events is the sum of
//! per-user min-weights across both, normalized by the geometric mean of the
//! events' total weight sums:
//!
//! `similarity(a, b) = pairMinSum(a, b) / sqrt(weightSum(a) * weightSum(b))`
//!
//! A user's weight for an event only ever increases (best action wins), so
//! every aggregate moves by deltas and no action requires a full recount.
//!
//! The engine performs no I/O. It returns the interaction and similarity
//! updates it derived; the worker persists and publishes them. Each call runs
//! under the acting user's lock, and the scan in `process_action` is linear
//! in the number of distinct events that user has interacted with, which is
//! the cost ceiling per action.

use crate::config::WeightsConfig;
use crate::locks::UserLocks;
use crate::store::WeightStore;
use agora_core::UserActionEvent;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// New stored weight for a (user, event) pair
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionUpdate {
    pub user_id: i64,
    pub event_id: i64,
    pub weight: f64,
    pub updated_at: DateTime<Utc>,
}

/// Refreshed similarity score for a canonical event pair
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityUpdate {
    /// Smaller event id of the pair
    pub event_a_id: i64,
    /// Larger event id of the pair
    pub event_b_id: i64,
    /// Score in [0, 1]
    pub score: f64,
    pub updated_at: DateTime<Utc>,
}

/// Everything a single applied action changed
#[derive(Debug, Clone, PartialEq)]
pub struct ActionUpdates {
    pub interaction: InteractionUpdate,
    pub similarities: Vec<SimilarityUpdate>,
}

/// Result of processing one action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The action raised the user's weight; updates need persisting
    Applied(ActionUpdates),
    /// The action was weaker than (or equal to) what is already stored
    Unchanged { current_weight: f64 },
}

/// Incremental similarity engine over the shared weight store
pub struct SimilarityEngine {
    weights: WeightsConfig,
    store: Arc<WeightStore>,
    locks: UserLocks,
}

impl SimilarityEngine {
    pub fn new(weights: WeightsConfig, store: Arc<WeightStore>) -> Self {
        Self {
            weights,
            store,
            locks: UserLocks::new(),
        }
    }

    /// The shared aggregate store
    pub fn store(&self) -> &Arc<WeightStore> {
        &self.store
    }

    /// Process one user action
    ///
    /// Same-user calls serialize on the user's lock; different users run in
    /// parallel. Reprocessing a delivered-twice action falls into the
    /// short-circuit and returns `Unchanged`, which makes redelivery safe.
    pub async fn process_action(&self, action: &UserActionEvent) -> ActionOutcome {
        let new_weight = self.weights.weight_for(action.action);

        let lock = self.locks.lock_for(action.user_id);
        let _guard = lock.lock().await;

        let old_weight = self.store.weight(action.user_id, action.event_id);
        if new_weight <= old_weight {
            return ActionOutcome::Unchanged {
                current_weight: old_weight,
            };
        }

        // Snapshot before writing so the scan covers only the user's other
        // events, at their pre-action weights.
        let other_weights = self.store.weights_for_user(action.user_id);

        let delta = new_weight - old_weight;
        self.store
            .set_weight(action.user_id, action.event_id, new_weight);
        let event_sum = self.store.add_weight_sum(action.event_id, delta);

        let now = Utc::now();
        let mut similarities = Vec::with_capacity(other_weights.len());

        for (&other_event, &other_weight) in &other_weights {
            if other_event == action.event_id || other_weight <= 0.0 {
                continue;
            }

            // The pair's min-sum grows only when the new weight overtakes
            // more of the other event's weight than the old one did.
            let old_min = old_weight.min(other_weight);
            let new_min = new_weight.min(other_weight);

            let pair_sum = if new_min > old_min {
                self.store
                    .add_pair_min_sum(action.event_id, other_event, new_min - old_min)
            } else {
                self.store.pair_min_sum(action.event_id, other_event)
            };

            let other_sum = self.store.weight_sum(other_event);
            if event_sum <= 0.0 || other_sum <= 0.0 {
                // Undefined similarity; nothing useful to emit.
                continue;
            }

            let score = (pair_sum / (event_sum * other_sum).sqrt()).min(1.0);
            similarities.push(SimilarityUpdate {
                event_a_id: action.event_id.min(other_event),
                event_b_id: action.event_id.max(other_event),
                score,
                updated_at: now,
            });
        }

        debug!(
            user_id = action.user_id,
            event_id = action.event_id,
            action = action.action.as_str(),
            weight = new_weight,
            pairs = similarities.len(),
            "Applied action"
        );

        ActionOutcome::Applied(ActionUpdates {
            interaction: InteractionUpdate {
                user_id: action.user_id,
                event_id: action.event_id,
                weight: new_weight,
                updated_at: now,
            },
            similarities,
        })
    }
}

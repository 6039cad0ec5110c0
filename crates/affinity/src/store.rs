//! In-Memory Weight Store
//!
//! Holds the three running aggregates the similarity engine maintains:
//! per-user event weights, per-event weight sums, and per-pair min-weight
//! sums. Each key updates atomically and independently of every other key;
//! cross-key invariants (monotonicity, sum consistency) are the engine's
//! responsibility, enforced under the per-user lock.
//!
//! Aggregates are volatile: after a restart they rebuild from the actions
//! observed from that point forward.

use dashmap::DashMap;
use std::collections::HashMap;

/// Canonical key for an unordered event pair
///
/// `a` is always the smaller event id, so `{x, y}` and `{y, x}` address the
/// same entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey {
    a: i64,
    b: i64,
}

impl PairKey {
    /// Create a canonical pair key from two event ids
    pub fn new(x: i64, y: i64) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }

    /// Smaller event id
    pub fn a(&self) -> i64 {
        self.a
    }

    /// Larger event id
    pub fn b(&self) -> i64 {
        self.b
    }
}

/// Concurrent store for the similarity aggregates
///
/// User weights are a two-level map so one user's weights can be snapshotted
/// without scanning unrelated users. Pair sums use a flat composite key,
/// which sidesteps nested-lock ordering between the two event ids.
pub struct WeightStore {
    user_event_weights: DashMap<i64, HashMap<i64, f64>>,
    event_weight_sums: DashMap<i64, f64>,
    pair_min_sums: DashMap<PairKey, f64>,
}

impl WeightStore {
    pub fn new() -> Self {
        Self {
            user_event_weights: DashMap::new(),
            event_weight_sums: DashMap::new(),
            pair_min_sums: DashMap::new(),
        }
    }

    /// Get a user's stored weight for an event (0.0 when absent)
    pub fn weight(&self, user_id: i64, event_id: i64) -> f64 {
        self.user_event_weights
            .get(&user_id)
            .and_then(|weights| weights.get(&event_id).copied())
            .unwrap_or(0.0)
    }

    /// Set a user's stored weight for an event
    pub fn set_weight(&self, user_id: i64, event_id: i64, weight: f64) {
        self.user_event_weights
            .entry(user_id)
            .or_default()
            .insert(event_id, weight);
    }

    /// Snapshot copy of all of a user's event weights
    pub fn weights_for_user(&self, user_id: i64) -> HashMap<i64, f64> {
        self.user_event_weights
            .get(&user_id)
            .map(|weights| weights.clone())
            .unwrap_or_default()
    }

    /// Get the total weight sum for an event (0.0 when absent)
    pub fn weight_sum(&self, event_id: i64) -> f64 {
        self.event_weight_sums
            .get(&event_id)
            .map(|sum| *sum)
            .unwrap_or(0.0)
    }

    /// Overwrite the total weight sum for an event
    ///
    /// Concurrent updates go through `add_weight_sum`; this is the plain
    /// store for seeding known totals.
    pub fn set_weight_sum(&self, event_id: i64, sum: f64) {
        self.event_weight_sums.insert(event_id, sum);
    }

    /// Atomically add a delta to an event's weight sum, returning the new sum
    pub fn add_weight_sum(&self, event_id: i64, delta: f64) -> f64 {
        let mut entry = self.event_weight_sums.entry(event_id).or_insert(0.0);
        *entry += delta;
        *entry
    }

    /// Get the min-weight sum for an event pair (0.0 when absent)
    pub fn pair_min_sum(&self, x: i64, y: i64) -> f64 {
        self.pair_min_sums
            .get(&PairKey::new(x, y))
            .map(|sum| *sum)
            .unwrap_or(0.0)
    }

    /// Atomically add a delta to a pair's min-weight sum, returning the new sum
    pub fn add_pair_min_sum(&self, x: i64, y: i64, delta: f64) -> f64 {
        let mut entry = self.pair_min_sums.entry(PairKey::new(x, y)).or_insert(0.0);
        *entry += delta;
        *entry
    }

    /// Number of users with at least one stored weight
    pub fn tracked_users(&self) -> usize {
        self.user_event_weights.len()
    }

    /// Number of events with a weight sum entry
    pub fn tracked_events(&self) -> usize {
        self.event_weight_sums.len()
    }

    /// Number of event pairs with a min-sum entry
    pub fn tracked_pairs(&self) -> usize {
        self.pair_min_sums.len()
    }
}

impl Default for WeightStore {
    fn default() -> Self {
        Self::new()
    }
}

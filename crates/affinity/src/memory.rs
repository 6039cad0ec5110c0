//! In-memory affinity repository
//!
//! Mirrors the PostgreSQL repository's semantics, including the
//! last-write-wins guards and every query's ordering and tie-breaks, so
//! tests and Postgres-less local runs exercise the same behavior the
//! production store has.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::engine::{InteractionUpdate, SimilarityUpdate};
use crate::repository::{AffinityRepository, ScoredEvent};

#[derive(Debug, Clone, Copy)]
struct SimilarityRow {
    score: f64,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct InteractionRow {
    weight: f64,
    last_updated: DateTime<Utc>,
}

/// In-memory implementation of AffinityRepository
pub struct InMemoryAffinityRepository {
    similarities: RwLock<HashMap<(i64, i64), SimilarityRow>>,
    interactions: RwLock<HashMap<(i64, i64), InteractionRow>>,
}

impl InMemoryAffinityRepository {
    pub fn new() -> Self {
        Self {
            similarities: RwLock::new(HashMap::new()),
            interactions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored pair rows (for testing)
    pub async fn similarity_count(&self) -> usize {
        self.similarities.read().await.len()
    }

    /// Stored score for a canonical pair, if any (for testing)
    pub async fn similarity_score(&self, event_a_id: i64, event_b_id: i64) -> Option<f64> {
        self.similarities
            .read()
            .await
            .get(&(event_a_id, event_b_id))
            .map(|row| row.score)
    }
}

impl Default for InMemoryAffinityRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_scored_desc(scored: &mut [ScoredEvent]) {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.event_id.cmp(&b.event_id))
    });
}

#[async_trait]
impl AffinityRepository for InMemoryAffinityRepository {
    async fn upsert_similarity(&self, update: &SimilarityUpdate) -> Result<()> {
        let mut similarities = self.similarities.write().await;
        let key = (update.event_a_id, update.event_b_id);

        match similarities.get(&key) {
            Some(existing) if existing.updated_at > update.updated_at => {}
            _ => {
                similarities.insert(
                    key,
                    SimilarityRow {
                        score: update.score,
                        updated_at: update.updated_at,
                    },
                );
            }
        }

        Ok(())
    }

    async fn upsert_interaction(&self, update: &InteractionUpdate) -> Result<()> {
        let mut interactions = self.interactions.write().await;
        let key = (update.user_id, update.event_id);

        match interactions.get(&key) {
            Some(existing) if existing.last_updated > update.updated_at => {}
            _ => {
                interactions.insert(
                    key,
                    InteractionRow {
                        weight: update.weight,
                        last_updated: update.updated_at,
                    },
                );
            }
        }

        Ok(())
    }

    async fn top_similar_excluding(
        &self,
        event_id: i64,
        excluded: &[i64],
        limit: i64,
    ) -> Result<Vec<ScoredEvent>> {
        let similarities = self.similarities.read().await;

        let mut scored: Vec<ScoredEvent> = similarities
            .iter()
            .filter_map(|(&(a, b), row)| {
                let other = if a == event_id {
                    b
                } else if b == event_id {
                    a
                } else {
                    return None;
                };

                if excluded.contains(&other) {
                    return None;
                }

                Some(ScoredEvent {
                    event_id: other,
                    score: row.score,
                })
            })
            .collect();

        sort_scored_desc(&mut scored);
        scored.truncate(limit.max(0) as usize);
        Ok(scored)
    }

    async fn top_similar_to_set(
        &self,
        seed_events: &[i64],
        limit: i64,
    ) -> Result<Vec<ScoredEvent>> {
        let similarities = self.similarities.read().await;

        let mut per_candidate: HashMap<i64, (f64, u32)> = HashMap::new();
        for (&(a, b), row) in similarities.iter() {
            for (side, other) in [(a, b), (b, a)] {
                if seed_events.contains(&side) && !seed_events.contains(&other) {
                    let entry = per_candidate.entry(other).or_insert((0.0, 0));
                    entry.0 += row.score;
                    entry.1 += 1;
                }
            }
        }

        let mut scored: Vec<ScoredEvent> = per_candidate
            .into_iter()
            .map(|(event_id, (total, count))| ScoredEvent {
                event_id,
                score: total / count as f64,
            })
            .collect();

        sort_scored_desc(&mut scored);
        scored.truncate(limit.max(0) as usize);
        Ok(scored)
    }

    async fn neighbors_from(
        &self,
        primary_events: &[i64],
        candidate_pool: &[i64],
        max_neighbors: i64,
    ) -> Result<HashMap<i64, Vec<ScoredEvent>>> {
        let similarities = self.similarities.read().await;

        let mut neighbors: HashMap<i64, Vec<ScoredEvent>> = HashMap::new();
        for (&(a, b), row) in similarities.iter() {
            for (primary, neighbor) in [(a, b), (b, a)] {
                if primary_events.contains(&primary) && candidate_pool.contains(&neighbor) {
                    neighbors.entry(primary).or_default().push(ScoredEvent {
                        event_id: neighbor,
                        score: row.score,
                    });
                }
            }
        }

        for list in neighbors.values_mut() {
            sort_scored_desc(list);
            list.truncate(max_neighbors.max(0) as usize);
        }

        Ok(neighbors)
    }

    async fn interacted_events(&self, user_id: i64) -> Result<Vec<i64>> {
        let interactions = self.interactions.read().await;

        let mut events: Vec<i64> = interactions
            .keys()
            .filter(|&&(user, _)| user == user_id)
            .map(|&(_, event)| event)
            .collect();

        events.sort_unstable();
        Ok(events)
    }

    async fn recent_interacted_events(&self, user_id: i64, limit: i64) -> Result<Vec<i64>> {
        let interactions = self.interactions.read().await;

        let mut rows: Vec<(i64, DateTime<Utc>)> = interactions
            .iter()
            .filter(|&(&(user, _), _)| user == user_id)
            .map(|(&(_, event), row)| (event, row.last_updated))
            .collect();

        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows.into_iter().map(|(event, _)| event).collect())
    }

    async fn interaction_weights(
        &self,
        user_id: i64,
        event_ids: &[i64],
    ) -> Result<HashMap<i64, f64>> {
        let interactions = self.interactions.read().await;

        let mut weights = HashMap::new();
        for &event_id in event_ids {
            if let Some(row) = interactions.get(&(user_id, event_id)) {
                weights.insert(event_id, row.weight);
            }
        }

        Ok(weights)
    }

    async fn interaction_counts(&self, event_ids: &[i64]) -> Result<Vec<ScoredEvent>> {
        let interactions = self.interactions.read().await;

        let mut totals: HashMap<i64, f64> = HashMap::new();
        for (&(_, event), row) in interactions.iter() {
            if event_ids.contains(&event) {
                *totals.entry(event).or_insert(0.0) += row.weight;
            }
        }

        Ok(event_ids
            .iter()
            .map(|&event_id| ScoredEvent {
                event_id,
                score: totals.get(&event_id).copied().unwrap_or(0.0),
            })
            .collect())
    }
}

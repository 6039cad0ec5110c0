//! Affinity repository for PostgreSQL persistence
//!
//! Stores the durable mirror of the engine's output: one row per canonical
//! event pair in `event_similarities` and one row per (user, event) in
//! `user_interactions`. Both upserts are last-write-wins on their timestamp
//! column, so replayed or out-of-order writes cannot roll a row backwards.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::HashMap;

use crate::engine::{InteractionUpdate, SimilarityUpdate};

/// An event id with its similarity or prediction score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEvent {
    pub event_id: i64,
    pub score: f64,
}

/// Affinity repository trait for persistence operations
#[async_trait]
pub trait AffinityRepository: Send + Sync {
    // Write path, fed by the update engine's output
    async fn upsert_similarity(&self, update: &SimilarityUpdate) -> Result<()>;
    async fn upsert_interaction(&self, update: &InteractionUpdate) -> Result<()>;

    // Similarity queries
    async fn top_similar_excluding(
        &self,
        event_id: i64,
        excluded: &[i64],
        limit: i64,
    ) -> Result<Vec<ScoredEvent>>;
    async fn top_similar_to_set(
        &self,
        seed_events: &[i64],
        limit: i64,
    ) -> Result<Vec<ScoredEvent>>;
    async fn neighbors_from(
        &self,
        primary_events: &[i64],
        candidate_pool: &[i64],
        max_neighbors: i64,
    ) -> Result<HashMap<i64, Vec<ScoredEvent>>>;

    // Interaction queries
    async fn interacted_events(&self, user_id: i64) -> Result<Vec<i64>>;
    async fn recent_interacted_events(&self, user_id: i64, limit: i64) -> Result<Vec<i64>>;
    async fn interaction_weights(
        &self,
        user_id: i64,
        event_ids: &[i64],
    ) -> Result<HashMap<i64, f64>>;
    async fn interaction_counts(&self, event_ids: &[i64]) -> Result<Vec<ScoredEvent>>;
}

/// PostgreSQL implementation of AffinityRepository
pub struct PostgresAffinityRepository {
    pool: PgPool,
}

impl PostgresAffinityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AffinityRepository for PostgresAffinityRepository {
    async fn upsert_similarity(&self, update: &SimilarityUpdate) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO event_similarities (event_a_id, event_b_id, score, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_a_id, event_b_id) DO UPDATE SET
                score = EXCLUDED.score,
                updated_at = EXCLUDED.updated_at
            WHERE event_similarities.updated_at <= EXCLUDED.updated_at
            "#,
        )
        .bind(update.event_a_id)
        .bind(update.event_b_id)
        .bind(update.score)
        .bind(update.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert similarity")?;

        Ok(())
    }

    async fn upsert_interaction(&self, update: &InteractionUpdate) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_interactions (user_id, event_id, weight, last_updated)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, event_id) DO UPDATE SET
                weight = EXCLUDED.weight,
                last_updated = EXCLUDED.last_updated
            WHERE user_interactions.last_updated <= EXCLUDED.last_updated
            "#,
        )
        .bind(update.user_id)
        .bind(update.event_id)
        .bind(update.weight)
        .bind(update.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert interaction")?;

        Ok(())
    }

    async fn top_similar_excluding(
        &self,
        event_id: i64,
        excluded: &[i64],
        limit: i64,
    ) -> Result<Vec<ScoredEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT
                CASE WHEN event_a_id = $1 THEN event_b_id ELSE event_a_id END AS other_id,
                score
            FROM event_similarities
            WHERE (event_a_id = $1 OR event_b_id = $1)
              AND (CASE WHEN event_a_id = $1 THEN event_b_id ELSE event_a_id END) <> ALL($2)
            ORDER BY score DESC, other_id
            LIMIT $3
            "#,
        )
        .bind(event_id)
        .bind(excluded)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query similar events")?;

        rows.into_iter()
            .map(|row| {
                Ok(ScoredEvent {
                    event_id: row.try_get("other_id")?,
                    score: row.try_get("score")?,
                })
            })
            .collect::<Result<Vec<_>>>()
    }

    async fn top_similar_to_set(
        &self,
        seed_events: &[i64],
        limit: i64,
    ) -> Result<Vec<ScoredEvent>> {
        // Unpivot both sides of every pair touching a seed, then rank the
        // non-seed side by its average score across all connecting pairs.
        let rows = sqlx::query(
            r#"
            WITH pair_sides AS (
                SELECT event_b_id AS candidate_id, score
                FROM event_similarities
                WHERE event_a_id = ANY($1)
                UNION ALL
                SELECT event_a_id AS candidate_id, score
                FROM event_similarities
                WHERE event_b_id = ANY($1)
            )
            SELECT candidate_id, AVG(score) AS score
            FROM pair_sides
            WHERE candidate_id <> ALL($1)
            GROUP BY candidate_id
            ORDER BY score DESC, candidate_id
            LIMIT $2
            "#,
        )
        .bind(seed_events)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query similar events for seed set")?;

        rows.into_iter()
            .map(|row| {
                Ok(ScoredEvent {
                    event_id: row.try_get("candidate_id")?,
                    score: row.try_get("score")?,
                })
            })
            .collect::<Result<Vec<_>>>()
    }

    async fn neighbors_from(
        &self,
        primary_events: &[i64],
        candidate_pool: &[i64],
        max_neighbors: i64,
    ) -> Result<HashMap<i64, Vec<ScoredEvent>>> {
        let rows = sqlx::query(
            r#"
            WITH directed AS (
                SELECT event_a_id AS primary_id, event_b_id AS neighbor_id, score
                FROM event_similarities
                WHERE event_a_id = ANY($1) AND event_b_id = ANY($2)
                UNION ALL
                SELECT event_b_id AS primary_id, event_a_id AS neighbor_id, score
                FROM event_similarities
                WHERE event_b_id = ANY($1) AND event_a_id = ANY($2)
            ),
            ranked AS (
                SELECT
                    primary_id, neighbor_id, score,
                    ROW_NUMBER() OVER (
                        PARTITION BY primary_id
                        ORDER BY score DESC, neighbor_id
                    ) AS neighbor_rank
                FROM directed
            )
            SELECT primary_id, neighbor_id, score
            FROM ranked
            WHERE neighbor_rank <= $3
            ORDER BY primary_id, neighbor_rank
            "#,
        )
        .bind(primary_events)
        .bind(candidate_pool)
        .bind(max_neighbors)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query neighbors")?;

        let mut neighbors: HashMap<i64, Vec<ScoredEvent>> = HashMap::new();
        for row in rows {
            let primary_id: i64 = row.try_get("primary_id")?;
            let neighbor_id: i64 = row.try_get("neighbor_id")?;
            let score: f64 = row.try_get("score")?;

            neighbors.entry(primary_id).or_default().push(ScoredEvent {
                event_id: neighbor_id,
                score,
            });
        }

        Ok(neighbors)
    }

    async fn interacted_events(&self, user_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT event_id
            FROM user_interactions
            WHERE user_id = $1
            ORDER BY event_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load interacted events")?;

        rows.into_iter()
            .map(|row| Ok(row.try_get("event_id")?))
            .collect::<Result<Vec<_>>>()
    }

    async fn recent_interacted_events(&self, user_id: i64, limit: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT event_id
            FROM user_interactions
            WHERE user_id = $1
            ORDER BY last_updated DESC, event_id
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load recent interacted events")?;

        rows.into_iter()
            .map(|row| Ok(row.try_get("event_id")?))
            .collect::<Result<Vec<_>>>()
    }

    async fn interaction_weights(
        &self,
        user_id: i64,
        event_ids: &[i64],
    ) -> Result<HashMap<i64, f64>> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, weight
            FROM user_interactions
            WHERE user_id = $1 AND event_id = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(event_ids)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load interaction weights")?;

        let mut weights = HashMap::new();
        for row in rows {
            let event_id: i64 = row.try_get("event_id")?;
            let weight: f64 = row.try_get("weight")?;
            weights.insert(event_id, weight);
        }

        Ok(weights)
    }

    async fn interaction_counts(&self, event_ids: &[i64]) -> Result<Vec<ScoredEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, SUM(weight) AS total_weight
            FROM user_interactions
            WHERE event_id = ANY($1)
            GROUP BY event_id
            "#,
        )
        .bind(event_ids)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load interaction counts")?;

        let mut totals = HashMap::new();
        for row in rows {
            let event_id: i64 = row.try_get("event_id")?;
            let total: f64 = row.try_get("total_weight")?;
            totals.insert(event_id, total);
        }

        // Answer in request order, zero for events nobody has touched.
        Ok(event_ids
            .iter()
            .map(|&event_id| ScoredEvent {
                event_id,
                score: totals.get(&event_id).copied().unwrap_or(0.0),
            })
            .collect())
    }
}

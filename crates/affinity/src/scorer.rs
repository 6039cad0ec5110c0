//! Recommendation scoring over persisted similarities
//!
//! Read-only query layer on top of the repository. Predictions use the
//! item-based k-nearest-neighbor approach: candidates are events similar to
//! the user's recent interactions, and each candidate's score is a
//! similarity-weighted average of the user's own weights for that
//! candidate's neighbors.

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use crate::config::ScoringConfig;
use crate::repository::{AffinityRepository, ScoredEvent};

/// Serves similarity and prediction queries
pub struct RecommendationScorer {
    repository: Arc<dyn AffinityRepository>,
    config: ScoringConfig,
}

impl RecommendationScorer {
    pub fn new(repository: Arc<dyn AffinityRepository>, config: ScoringConfig) -> Self {
        Self { repository, config }
    }

    /// Events most similar to `event_id`, skipping those the user already
    /// interacted with
    pub async fn find_similar_events(
        &self,
        event_id: i64,
        user_id: i64,
        max_results: i64,
    ) -> Result<Vec<ScoredEvent>> {
        let interacted = self.repository.interacted_events(user_id).await?;
        self.repository
            .top_similar_excluding(event_id, &interacted, max_results)
            .await
    }

    /// Total interaction weight per requested event, in request order
    pub async fn interactions_count(&self, event_ids: &[i64]) -> Result<Vec<ScoredEvent>> {
        self.repository.interaction_counts(event_ids).await
    }

    /// Predicted scores for events the user has not interacted with
    ///
    /// Candidates are ranked by their average similarity to the user's
    /// recent interactions, and that candidate order is what comes back;
    /// the predicted scores are not re-sorted. Callers wanting a strict
    /// by-score ranking sort the result themselves.
    pub async fn user_predictions(
        &self,
        user_id: i64,
        max_results: i64,
    ) -> Result<Vec<ScoredEvent>> {
        let seed = self
            .repository
            .recent_interacted_events(user_id, self.config.recent_events_limit as i64)
            .await?;
        if seed.is_empty() {
            debug!(user_id = user_id, "No interaction history, no predictions");
            return Ok(Vec::new());
        }

        let candidates = self.repository.top_similar_to_set(&seed, max_results).await?;
        if candidates.is_empty() {
            debug!(user_id = user_id, "No events similar to recent history");
            return Ok(Vec::new());
        }

        let history = self.repository.interacted_events(user_id).await?;
        let candidate_ids: Vec<i64> = candidates.iter().map(|c| c.event_id).collect();

        // Each candidate is grounded in the user's own history: its
        // neighbors are restricted to events the user has weights for.
        let neighbors = self
            .repository
            .neighbors_from(&candidate_ids, &history, self.config.neighbor_limit as i64)
            .await?;
        let weights = self.repository.interaction_weights(user_id, &history).await?;

        let predictions = candidates
            .iter()
            .map(|candidate| {
                let score = match neighbors.get(&candidate.event_id) {
                    Some(list) if !list.is_empty() => {
                        let mut weighted_sum = 0.0;
                        let mut similarity_sum = 0.0;
                        for neighbor in list {
                            let user_weight =
                                weights.get(&neighbor.event_id).copied().unwrap_or(0.0);
                            weighted_sum += neighbor.score * user_weight;
                            similarity_sum += neighbor.score;
                        }
                        if similarity_sum > 0.0 {
                            weighted_sum / similarity_sum
                        } else {
                            0.0
                        }
                    }
                    // No neighbors in the user's history means no evidence.
                    _ => 0.0,
                };

                ScoredEvent {
                    event_id: candidate.event_id,
                    score,
                }
            })
            .collect();

        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{InteractionUpdate, SimilarityUpdate};
    use crate::memory::InMemoryAffinityRepository;
    use chrono::{Duration, Utc};

    async fn seed_repository() -> Arc<InMemoryAffinityRepository> {
        let repo = Arc::new(InMemoryAffinityRepository::new());
        let now = Utc::now();

        // User 1 history: event 10 (like, most recent), event 20 (bookmark).
        repo.upsert_interaction(&InteractionUpdate {
            user_id: 1,
            event_id: 10,
            weight: 1.0,
            updated_at: now,
        })
        .await
        .unwrap();
        repo.upsert_interaction(&InteractionUpdate {
            user_id: 1,
            event_id: 20,
            weight: 0.5,
            updated_at: now - Duration::seconds(60),
        })
        .await
        .unwrap();

        for (a, b, score) in [(10, 40, 0.9), (10, 30, 0.8), (20, 30, 0.4), (100, 200, 0.7)] {
            repo.upsert_similarity(&SimilarityUpdate {
                event_a_id: a,
                event_b_id: b,
                score,
                updated_at: now,
            })
            .await
            .unwrap();
        }

        repo
    }

    fn scorer(repo: Arc<InMemoryAffinityRepository>) -> RecommendationScorer {
        RecommendationScorer::new(repo, ScoringConfig::default())
    }

    #[tokio::test]
    async fn test_find_similar_events_excludes_user_history() {
        let repo = seed_repository().await;
        let scorer = scorer(repo.clone());

        // Event 10 pairs with 40 and 30; user 2 has no history to exclude.
        let similar = scorer.find_similar_events(10, 2, 10).await.unwrap();
        let ids: Vec<i64> = similar.iter().map(|s| s.event_id).collect();
        assert_eq!(ids, vec![40, 30]);

        // User 3 already interacted with event 40.
        repo.upsert_interaction(&InteractionUpdate {
            user_id: 3,
            event_id: 40,
            weight: 0.3,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

        let similar = scorer.find_similar_events(10, 3, 10).await.unwrap();
        let ids: Vec<i64> = similar.iter().map(|s| s.event_id).collect();
        assert_eq!(ids, vec![30]);
    }

    #[tokio::test]
    async fn test_interactions_count_passthrough() {
        let repo = seed_repository().await;
        let scorer = scorer(repo);

        let counts = scorer.interactions_count(&[10, 99]).await.unwrap();
        assert_eq!(counts.len(), 2);
        assert!((counts[0].score - 1.0).abs() < 1e-12);
        assert_eq!(counts[1].score, 0.0);
    }

    #[tokio::test]
    async fn test_user_predictions_weighted_average() {
        let repo = seed_repository().await;
        let scorer = scorer(repo);

        let predictions = scorer.user_predictions(1, 10).await.unwrap();

        // Candidate order follows average similarity to the seed:
        // 40 (0.9) ahead of 30 ((0.8 + 0.4) / 2 = 0.6).
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].event_id, 40);
        assert_eq!(predictions[1].event_id, 30);

        // 40 neighbors only event 10: (0.9 * 1.0) / 0.9 = 1.0.
        assert!((predictions[0].score - 1.0).abs() < 1e-12);

        // 30 neighbors 10 and 20: (0.8 * 1.0 + 0.4 * 0.5) / 1.2.
        let expected = (0.8 + 0.2) / 1.2;
        assert!((predictions[1].score - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_user_predictions_empty_without_history() {
        let repo = seed_repository().await;
        let scorer = scorer(repo);

        let predictions = scorer.user_predictions(999, 10).await.unwrap();
        assert!(predictions.is_empty());
    }

    #[tokio::test]
    async fn test_user_predictions_keeps_zero_evidence_candidate() {
        let repo = Arc::new(InMemoryAffinityRepository::new());
        let now = Utc::now();

        repo.upsert_interaction(&InteractionUpdate {
            user_id: 5,
            event_id: 10,
            weight: 1.0,
            updated_at: now,
        })
        .await
        .unwrap();

        // A backfilled zero-score pair: the candidate surfaces but the
        // similarity sum carries no evidence to weight against.
        repo.upsert_similarity(&SimilarityUpdate {
            event_a_id: 10,
            event_b_id: 70,
            score: 0.0,
            updated_at: now,
        })
        .await
        .unwrap();

        let scorer = scorer(repo);
        let predictions = scorer.user_predictions(5, 10).await.unwrap();

        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].event_id, 70);
        assert_eq!(predictions[0].score, 0.0);
    }

    #[tokio::test]
    async fn test_user_predictions_empty_without_candidates() {
        let repo = Arc::new(InMemoryAffinityRepository::new());

        // History exists but nothing is similar to it.
        repo.upsert_interaction(&InteractionUpdate {
            user_id: 1,
            event_id: 10,
            weight: 1.0,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

        let scorer = scorer(repo);
        let predictions = scorer.user_predictions(1, 10).await.unwrap();
        assert!(predictions.is_empty());
    }

    #[tokio::test]
    async fn test_user_predictions_respects_max_results() {
        let repo = seed_repository().await;
        let scorer = scorer(repo);

        let predictions = scorer.user_predictions(1, 1).await.unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].event_id, 40);
    }
}

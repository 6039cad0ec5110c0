//! Exponential backoff retry utility
//!
//! Configurable retry with exponential backoff and jitter for transient
//! failures. Callers decide which errors are transient via a predicate, so
//! validation failures and other permanent errors fail fast.
//!
//! # Example
//!
//! ```
//! use agora_core::retry::{retry_with_backoff, RetryPolicy};
//! use agora_core::AgoraError;
//!
//! # async fn example(pool: sqlx::PgPool) -> Result<(), AgoraError> {
//! let row_count = retry_with_backoff(
//!     || async {
//!         sqlx::query("SELECT 1")
//!             .execute(&pool)
//!             .await
//!             .map_err(|e| AgoraError::database("probe failed", e))
//!     },
//!     RetryPolicy::default(),
//!     |err: &AgoraError| err.is_retryable(),
//! )
//! .await?;
//! # let _ = row_count;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 means only the initial attempt)
    pub max_retries: u32,

    /// Base delay in milliseconds for the first retry
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds to cap exponential growth
    pub max_delay_ms: u64,

    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// 3 retries, 100ms base, 5s cap, jitter on
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64, jitter: bool) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            jitter,
        }
    }

    /// More attempts with shorter initial delay, for operations that must
    /// land (5 retries, 50ms base)
    pub fn aggressive() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 50,
            max_delay_ms: 5000,
            jitter: true,
        }
    }

    /// Fewer attempts with longer delays, for non-critical work
    /// (2 retries, 500ms base)
    pub fn gentle() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 3000,
            jitter: true,
        }
    }

    /// Delay for a given 0-indexed attempt: min(base * 2^attempt, max),
    /// plus up to 30% jitter when enabled
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt));

        let capped_delay = exponential_delay.min(self.max_delay_ms);

        let final_delay = if self.jitter {
            let jitter_range = (capped_delay as f64 * 0.3) as u64;
            let jitter = if jitter_range > 0 {
                // Clock-derived jitter; backoff does not need a real RNG
                let nanos = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .subsec_nanos() as u64;
                nanos % (jitter_range + 1)
            } else {
                0
            };
            capped_delay.saturating_add(jitter)
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay)
    }
}

/// Retries an async operation with exponential backoff
///
/// Runs the closure and retries failures the `is_retryable` predicate accepts,
/// up to `policy.max_retries` times. Non-retryable errors return immediately.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    mut operation: F,
    policy: RetryPolicy,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                tracing::debug!(attempt = attempt, "Operation succeeded");
                return Ok(result);
            }
            Err(error) => {
                if attempt >= policy.max_retries {
                    tracing::warn!(
                        attempt = attempt,
                        max_retries = policy.max_retries,
                        "All retry attempts exhausted"
                    );
                    return Err(error);
                }

                if !is_retryable(&error) {
                    tracing::debug!(attempt = attempt, "Error is not retryable, failing");
                    return Err(error);
                }

                let delay = policy.calculate_delay(attempt);
                tracing::debug!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after delay"
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay_ms, 100);
        assert_eq!(policy.max_delay_ms, 5000);
        assert!(policy.jitter);
    }

    #[test]
    fn test_calculate_delay_exponential_progression() {
        let policy = RetryPolicy::new(5, 100, 10000, false);

        assert_eq!(policy.calculate_delay(0).as_millis(), 100);
        assert_eq!(policy.calculate_delay(1).as_millis(), 200);
        assert_eq!(policy.calculate_delay(2).as_millis(), 400);
        assert_eq!(policy.calculate_delay(3).as_millis(), 800);
        assert_eq!(policy.calculate_delay(4).as_millis(), 1600);
    }

    #[test]
    fn test_calculate_delay_max_cap() {
        let policy = RetryPolicy::new(10, 100, 500, false);

        // 100 * 2^5 = 3200, capped at 500
        assert_eq!(policy.calculate_delay(5).as_millis(), 500);
        assert_eq!(policy.calculate_delay(10).as_millis(), 500);
    }

    #[test]
    fn test_calculate_delay_with_jitter() {
        let policy = RetryPolicy::new(3, 1000, 5000, true);

        let delay_ms = policy.calculate_delay(0).as_millis();
        assert!(delay_ms >= 1000);
        assert!(delay_ms <= 1300);
    }

    #[tokio::test]
    async fn test_retry_succeeds_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(
            || {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>("success")
                }
            },
            RetryPolicy::default(),
            |_: &String| true,
        )
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(
            || {
                let c = counter_clone.clone();
                async move {
                    let count = c.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err("temporary failure")
                    } else {
                        Ok("success")
                    }
                }
            },
            RetryPolicy::new(5, 10, 100, false),
            |_: &&str| true,
        )
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(
            || {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("persistent failure")
                }
            },
            RetryPolicy::new(3, 10, 100, false),
            |_: &&str| true,
        )
        .await;

        assert_eq!(result.unwrap_err(), "persistent failure");
        assert_eq!(counter.load(Ordering::SeqCst), 4); // initial + 3 retries
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(
            || {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("non-retryable")
                }
            },
            RetryPolicy::default(),
            |err: &&str| *err != "non-retryable",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_with_agora_error_classification() {
        use crate::error::AgoraError;

        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(
            || {
                let c = counter_clone.clone();
                async move {
                    let count = c.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err(AgoraError::NetworkError {
                            message: "Connection timeout".to_string(),
                            source: None,
                        })
                    } else {
                        Ok("success")
                    }
                }
            },
            RetryPolicy::new(5, 10, 100, false),
            |err: &AgoraError| err.is_retryable(),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        // A validation error is not retried at all
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(
            || {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(AgoraError::ValidationError {
                        message: "Invalid input".to_string(),
                        field: None,
                    })
                }
            },
            RetryPolicy::default(),
            |err: &AgoraError| err.is_retryable(),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(
            || {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("failure")
                }
            },
            RetryPolicy::new(0, 100, 1000, false),
            |_: &&str| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

//! Retry policy walkthrough
//!
//! Shows how the backoff policies behave against transient and permanent
//! failures. Run with `cargo run --example retry_usage -p agora-core`.

use agora_core::error::AgoraError;
use agora_core::retry::{retry_with_backoff, RetryPolicy};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A network call that needs two retries before it succeeds
async fn flaky_network_request(attempts: Arc<AtomicU32>) -> Result<String, AgoraError> {
    let attempt = attempts.fetch_add(1, Ordering::SeqCst);

    if attempt < 2 {
        Err(AgoraError::NetworkError {
            message: format!("connection timeout on attempt {}", attempt + 1),
            source: None,
        })
    } else {
        Ok(format!("connected after {} attempts", attempt + 1))
    }
}

/// A database write that fails once with a transient pool error
async fn database_write(attempts: Arc<AtomicU32>) -> Result<String, AgoraError> {
    let attempt = attempts.fetch_add(1, Ordering::SeqCst);

    if attempt == 0 {
        Err(AgoraError::DatabaseError {
            message: "connection pool exhausted".to_string(),
            source: None,
        })
    } else {
        Ok("row written".to_string())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("1. Default policy against a flaky network call:");
    let attempts = Arc::new(AtomicU32::new(0));
    let result = retry_with_backoff(
        || flaky_network_request(attempts.clone()),
        RetryPolicy::default(),
        |err: &AgoraError| err.is_retryable(),
    )
    .await;
    println!(
        "   {:?} after {} attempts\n",
        result,
        attempts.load(Ordering::SeqCst)
    );

    println!("2. Aggressive policy for a write that must land:");
    let attempts = Arc::new(AtomicU32::new(0));
    let result = retry_with_backoff(
        || database_write(attempts.clone()),
        RetryPolicy::aggressive(),
        |err: &AgoraError| err.is_retryable(),
    )
    .await;
    println!(
        "   {:?} after {} attempts\n",
        result,
        attempts.load(Ordering::SeqCst)
    );

    println!("3. Validation failures are permanent, no retry happens:");
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_inner = attempts.clone();
    let result = retry_with_backoff(
        || {
            let attempts = attempts_inner.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(AgoraError::ValidationError {
                    message: "user_id must be positive".to_string(),
                    field: Some("user_id".to_string()),
                })
            }
        },
        RetryPolicy::default(),
        |err: &AgoraError| err.is_retryable(),
    )
    .await;
    println!(
        "   {:?} after {} attempt\n",
        result.err().map(|e| e.to_string()),
        attempts.load(Ordering::SeqCst)
    );

    println!("4. Gentle policy exhausts quickly on persistent failures:");
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_inner = attempts.clone();
    let result = retry_with_backoff(
        || {
            let attempts = attempts_inner.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(AgoraError::NetworkError {
                    message: "host unreachable".to_string(),
                    source: None,
                })
            }
        },
        RetryPolicy::gentle(),
        |err: &AgoraError| err.is_retryable(),
    )
    .await;
    println!(
        "   {:?} after {} attempts (initial + 2 retries)",
        result.err().map(|e| e.to_string()),
        attempts.load(Ordering::SeqCst)
    );

    Ok(())
}

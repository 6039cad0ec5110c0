//! Action queue implementation using Redis Streams
//!
//! Actions enter the service through a single stream consumed by a consumer
//! group, so every action is delivered to exactly one worker at least once.
//! Payloads that fail to decode are acked and moved to the dead letter
//! stream; a junk message must never wedge the consumer.

use agora_core::UserActionEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{
    streams::{StreamReadOptions, StreamReadReply},
    AsyncCommands, Client,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::config::QueueConfig;

/// Action queue errors
#[derive(Debug, thiserror::Error)]
pub enum ActionQueueError {
    #[error("Redis error: {0}")]
    RedisError(String),

    #[error("Queue error: {0}")]
    QueueError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type QueueResult<T> = Result<T, ActionQueueError>;

/// Action queue trait
#[async_trait]
pub trait ActionQueue: Send + Sync {
    /// Enqueue an action for processing
    async fn enqueue(&self, action: UserActionEvent) -> QueueResult<String>;

    /// Dequeue the next action for processing
    async fn dequeue(&self, consumer_name: &str)
        -> QueueResult<Option<(String, UserActionEvent)>>;

    /// Acknowledge successful processing
    async fn ack(&self, message_id: &str) -> QueueResult<()>;

    /// Move to the dead letter queue
    async fn dead_letter(&self, dead: DeadLetteredAction) -> QueueResult<()>;

    /// Get queue statistics
    async fn stats(&self) -> QueueResult<QueueStats>;
}

/// Queue statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending_count: u64,
    pub processing_count: u64,
    pub dead_letter_count: u64,
    pub total_processed: u64,
}

/// An action that could not be processed, preserved for inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetteredAction {
    /// Raw payload as it arrived on the stream
    pub payload: String,

    /// Why processing failed
    pub error: String,

    pub failed_at: DateTime<Utc>,
}

impl DeadLetteredAction {
    pub fn new(payload: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            error: error.into(),
            failed_at: Utc::now(),
        }
    }

    /// Build from an action that decoded but failed downstream
    pub fn from_action(action: &UserActionEvent, error: impl Into<String>) -> QueueResult<Self> {
        Ok(Self::new(serde_json::to_string(action)?, error))
    }
}

/// Redis Streams action queue
pub struct RedisActionQueue {
    client: Client,
    stream_key: String,
    dlq_key: String,
    consumer_group: String,
    processing_count: Arc<AtomicU64>,
    total_processed: Arc<AtomicU64>,
}

impl RedisActionQueue {
    /// Create a new Redis action queue
    pub fn new(redis_url: &str, config: &QueueConfig) -> QueueResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| ActionQueueError::RedisError(format!("Failed to connect: {}", e)))?;

        Ok(Self {
            client,
            stream_key: config.stream_key.clone(),
            dlq_key: config.dlq_key.clone(),
            consumer_group: config.consumer_group.clone(),
            processing_count: Arc::new(AtomicU64::new(0)),
            total_processed: Arc::new(AtomicU64::new(0)),
        })
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ActionQueueError::RedisError(format!("Connection failed: {}", e)))
    }

    /// Initialize the consumer group, creating the stream if needed
    async fn ensure_consumer_group(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        // BUSYGROUP means the group already exists
        let _: Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(&self.stream_key, &self.consumer_group, "0")
            .await;

        Ok(())
    }
}

#[async_trait]
impl ActionQueue for RedisActionQueue {
    async fn enqueue(&self, action: UserActionEvent) -> QueueResult<String> {
        self.ensure_consumer_group().await?;
        let mut conn = self.connection().await?;

        let payload_json = serde_json::to_string(&action)?;

        let message_id: String = conn
            .xadd(&self.stream_key, "*", &[("payload", payload_json)])
            .await
            .map_err(|e| ActionQueueError::QueueError(format!("Failed to enqueue: {}", e)))?;

        Ok(message_id)
    }

    async fn dequeue(
        &self,
        consumer_name: &str,
    ) -> QueueResult<Option<(String, UserActionEvent)>> {
        self.ensure_consumer_group().await?;
        let mut conn = self.connection().await?;

        let opts = StreamReadOptions::default()
            .group(&self.consumer_group, consumer_name)
            .count(1)
            .block(100); // 100ms block

        let result: StreamReadReply = conn
            .xread_options(&[&self.stream_key], &[">"], &opts)
            .await
            .map_err(|e| ActionQueueError::QueueError(format!("Failed to dequeue: {}", e)))?;

        let stream_id = match result.keys.first().and_then(|key| key.ids.first()) {
            Some(stream_id) => stream_id,
            None => return Ok(None),
        };

        let message_id = stream_id.id.clone();

        let payload_bytes = match stream_id.map.get("payload") {
            Some(redis::Value::Data(bytes)) => bytes,
            _ => {
                // Entry without a payload field; nothing to recover.
                self.processing_count.fetch_add(1, Ordering::Relaxed);
                self.dead_letter(DeadLetteredAction::new("", "missing payload field"))
                    .await?;
                self.ack(&message_id).await?;
                return Ok(None);
            }
        };

        let payload_str = String::from_utf8_lossy(payload_bytes);
        match serde_json::from_str::<UserActionEvent>(&payload_str) {
            Ok(action) => {
                self.processing_count.fetch_add(1, Ordering::Relaxed);
                Ok(Some((message_id, action)))
            }
            Err(e) => {
                warn!(
                    message_id = %message_id,
                    error = %e,
                    "Malformed action payload, moving to dead letter queue"
                );

                self.processing_count.fetch_add(1, Ordering::Relaxed);
                self.dead_letter(DeadLetteredAction::new(payload_str.into_owned(), e.to_string()))
                    .await?;
                self.ack(&message_id).await?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let _: i32 = conn
            .xack(&self.stream_key, &self.consumer_group, &[message_id])
            .await
            .map_err(|e| ActionQueueError::QueueError(format!("Failed to ack: {}", e)))?;

        self.processing_count.fetch_sub(1, Ordering::Relaxed);
        self.total_processed.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    async fn dead_letter(&self, dead: DeadLetteredAction) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let payload_json = serde_json::to_string(&dead)?;

        let _: String = conn
            .xadd(&self.dlq_key, "*", &[("payload", payload_json)])
            .await
            .map_err(|e| ActionQueueError::QueueError(format!("Failed to dead letter: {}", e)))?;

        Ok(())
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let mut conn = self.connection().await?;

        let pending: u64 = conn.xlen(&self.stream_key).await.unwrap_or(0);
        let dead_letter: u64 = conn.xlen(&self.dlq_key).await.unwrap_or(0);

        Ok(QueueStats {
            pending_count: pending,
            processing_count: self.processing_count.load(Ordering::Relaxed),
            dead_letter_count: dead_letter,
            total_processed: self.total_processed.load(Ordering::Relaxed),
        })
    }
}

/// In-memory action queue for tests and Redis-less local runs
pub struct InMemoryActionQueue {
    pending: tokio::sync::Mutex<VecDeque<(String, UserActionEvent)>>,
    in_flight: tokio::sync::Mutex<HashMap<String, UserActionEvent>>,
    dead: tokio::sync::Mutex<Vec<DeadLetteredAction>>,
    next_id: AtomicU64,
    total_processed: AtomicU64,
}

impl InMemoryActionQueue {
    pub fn new() -> Self {
        Self {
            pending: tokio::sync::Mutex::new(VecDeque::new()),
            in_flight: tokio::sync::Mutex::new(HashMap::new()),
            dead: tokio::sync::Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            total_processed: AtomicU64::new(0),
        }
    }

    /// Dead lettered actions recorded so far (for testing)
    pub async fn dead_lettered(&self) -> Vec<DeadLetteredAction> {
        self.dead.lock().await.clone()
    }
}

impl Default for InMemoryActionQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionQueue for InMemoryActionQueue {
    async fn enqueue(&self, action: UserActionEvent) -> QueueResult<String> {
        let message_id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.pending
            .lock()
            .await
            .push_back((message_id.clone(), action));
        Ok(message_id)
    }

    async fn dequeue(
        &self,
        _consumer_name: &str,
    ) -> QueueResult<Option<(String, UserActionEvent)>> {
        let next = self.pending.lock().await.pop_front();

        if let Some((message_id, action)) = next {
            self.in_flight
                .lock()
                .await
                .insert(message_id.clone(), action.clone());
            Ok(Some((message_id, action)))
        } else {
            Ok(None)
        }
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        self.in_flight.lock().await.remove(message_id);
        self.total_processed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn dead_letter(&self, dead: DeadLetteredAction) -> QueueResult<()> {
        self.dead.lock().await.push(dead);
        Ok(())
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        Ok(QueueStats {
            pending_count: self.pending.lock().await.len() as u64,
            processing_count: self.in_flight.lock().await.len() as u64,
            dead_letter_count: self.dead.lock().await.len() as u64,
            total_processed: self.total_processed.load(Ordering::Relaxed),
        })
    }
}

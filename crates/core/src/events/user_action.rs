//! User Action Events
//!
//! Typed representation of the actions users take on event listings:
//! - Browsing: views
//! - Engagement: comments, bookmarks, likes
//! - Participation: registrations
//!
//! Actions arrive over the action queue as JSON and feed the affinity engine,
//! which turns them into interaction weights and event-to-event similarities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Action event errors
#[derive(Debug, thiserror::Error)]
pub enum ActionEventError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid action data: {0}")]
    InvalidAction(String),
}

pub type ActionEventResult<T> = Result<T, ActionEventError>;

/// Kinds of user actions on event listings
///
/// Each kind carries a configured weight; stronger actions (like, register)
/// outrank weaker ones (view). Unknown kinds fail deserialization so the
/// queue boundary can dead-letter them instead of guessing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    View,
    Comment,
    Bookmark,
    Register,
    Like,
}

impl ActionKind {
    /// Every action kind, in ascending default-weight order
    pub const ALL: [ActionKind; 5] = [
        ActionKind::View,
        ActionKind::Comment,
        ActionKind::Bookmark,
        ActionKind::Register,
        ActionKind::Like,
    ];

    /// Get the wire/string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::View => "view",
            ActionKind::Comment => "comment",
            ActionKind::Bookmark => "bookmark",
            ActionKind::Register => "register",
            ActionKind::Like => "like",
        }
    }
}

/// User action event structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActionEvent {
    /// Unique action identifier for tracing and deduplication
    pub action_id: Uuid,

    /// User who performed the action
    pub user_id: i64,

    /// Event listing the action targets
    pub event_id: i64,

    /// Kind of action performed
    pub action: ActionKind,

    /// Timestamp when the action occurred
    pub occurred_at: DateTime<Utc>,
}

impl UserActionEvent {
    /// Create a new user action event occurring now
    pub fn new(user_id: i64, event_id: i64, action: ActionKind) -> Self {
        Self {
            action_id: Uuid::new_v4(),
            user_id,
            event_id,
            action,
            occurred_at: Utc::now(),
        }
    }

    /// Set an explicit occurrence timestamp
    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// Validate the action data
    ///
    /// Identifiers are platform database ids and must be positive.
    pub fn validate(&self) -> ActionEventResult<()> {
        if self.user_id <= 0 {
            return Err(ActionEventError::InvalidAction(format!(
                "user_id must be positive, got {}",
                self.user_id
            )));
        }

        if self.event_id <= 0 {
            return Err(ActionEventError::InvalidAction(format!(
                "event_id must be positive, got {}",
                self.event_id
            )));
        }

        Ok(())
    }
}

//! Inbound user action events
//!
//! This module defines the action event types the Agora platform emits when a
//! user interacts with an event listing (viewing, commenting, bookmarking,
//! registering, liking). Services consume these from the action queue and
//! derive interaction weights and event similarities from them.

pub mod user_action;

pub use user_action::{ActionEventError, ActionEventResult, ActionKind, UserActionEvent};

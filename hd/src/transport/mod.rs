//! Notification transport
//!
//! The chat transport is host-provided. The core only sends, schedules and
//! deletes messages through this trait and keeps the returned handles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{NotificationHandle, PersonaKind, SessionId};

/// Escalating tone of a reminder, by attempt index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Gentle,
    Nudge,
    Firm,
    Relentless,
}

/// What kind of message this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// An escalation round
    Reminder,
    /// Commitment was cancelled but must still be resolved
    CancelledReminder,
    /// Reply could not be interpreted
    Reprompt,
    /// A persona action failed
    ActionFailed,
}

/// A message ready for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub session_id: SessionId,
    pub persona: PersonaKind,
    pub kind: NotificationKind,
    pub tone: Tone,
    pub attempt: u32,
    pub text: String,
}

/// Errors surfaced by the transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Unknown notification handle: {0}")]
    UnknownHandle(NotificationHandle),

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Chat transport consumed by the core
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Send a message now
    async fn send(&self, target: &str, notification: &Notification) -> Result<NotificationHandle, TransportError>;

    /// Schedule a message for later delivery by the transport itself
    async fn schedule(
        &self,
        target: &str,
        notification: &Notification,
        at: DateTime<Utc>,
    ) -> Result<NotificationHandle, TransportError>;

    /// Delete a sent or scheduled message
    async fn cancel(&self, handle: &NotificationHandle) -> Result<(), TransportError>;
}

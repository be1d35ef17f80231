//! Handles issued by external collaborators
//!
//! Job IDs are derived deterministically from (session, kind) so that
//! rescheduling the same kind replaces the previous job instead of adding one.

use serde::{Deserialize, Serialize};

use super::SessionId;

/// Kind of scheduled job attached to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Next escalation round
    FollowUp,
    /// Commitment window opens, escalation begins
    WindowOpen,
    /// Commitment window closes, incomplete check
    WindowClose,
    /// Daily check for a missing commitment
    DailyBootstrap,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::FollowUp,
        JobKind::WindowOpen,
        JobKind::WindowClose,
        JobKind::DailyBootstrap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FollowUp => "follow_up",
            Self::WindowOpen => "window_open",
            Self::WindowClose => "window_close",
            Self::DailyBootstrap => "daily_bootstrap",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling-engine job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Deterministic job ID for a (session, kind) pair
    pub fn for_session(session_id: &SessionId, kind: JobKind) -> Self {
        Self(format!("haunt:{}:{}", session_id, kind))
    }

    /// Wrap a raw engine job ID
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to a sent or scheduled notification
///
/// Only ever used to cancel (delete) the notification later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationHandle(String);

impl NotificationHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NotificationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//! Session domain type
//!
//! A session is the unit of commitment being tracked. It is only ever mutated
//! by the Haunter that owns it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{JobId, NotificationHandle, SessionId};

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, window not yet open
    #[default]
    NotStarted,
    /// Actively escalating
    InProgress,
    /// Resolved; the only terminal state
    Complete,
    /// Commitment cancelled externally; still escalating until resolved
    Cancelled,
}

impl SessionStatus {
    /// Only `Complete` ends the haunting
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "SessionStatus::from_str: called");
        match s.to_lowercase().replace('-', "_").as_str() {
            "not_started" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "complete" => Ok(Self::Complete),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(format!("Unknown session status: '{}'", other)),
        }
    }
}

/// Which persona currently owns a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersonaKind {
    /// No commitment exists yet; push the user to make one
    Bootstrap,
    /// The commitment window is open; push the user to do it
    #[default]
    Commitment,
    /// The window closed without completion; push the user to resolve it
    Incomplete,
}

impl PersonaKind {
    pub const ALL: [PersonaKind; 3] = [PersonaKind::Bootstrap, PersonaKind::Commitment, PersonaKind::Incomplete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Commitment => "commitment",
            Self::Incomplete => "incomplete",
        }
    }
}

impl std::fmt::Display for PersonaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PersonaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bootstrap" => Ok(Self::Bootstrap),
            "commitment" => Ok(Self::Commitment),
            "incomplete" => Ok(Self::Incomplete),
            other => Err(format!(
                "Unknown persona: '{}'. Supported: bootstrap, commitment, incomplete",
                other
            )),
        }
    }
}

/// A tracked commitment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: SessionId,

    /// Owning persona
    pub persona: PersonaKind,

    /// Current status
    pub status: SessionStatus,

    /// Escalation rounds already sent
    pub attempt: u32,

    /// Live follow-up job, if any
    #[serde(default)]
    pub scheduled_job_id: Option<JobId>,

    /// Outstanding notifications, oldest first
    ///
    /// Holds at most the pending window notice and the latest delivered
    /// message; older deliveries are dropped once superseded.
    #[serde(default)]
    pub scheduled_notification_ids: Vec<NotificationHandle>,

    /// Window notice pre-scheduled with the transport, until the window opens
    #[serde(default)]
    pub window_notice_id: Option<NotificationHandle>,

    /// Transport address (chat id, channel, ...)
    pub target: String,

    /// Short human-readable title ("Plan tomorrow")
    pub title: String,

    /// When the committed window opens
    #[serde(default)]
    pub window_start: Option<DateTime<Utc>>,

    /// When the committed window closes
    #[serde(default)]
    pub window_end: Option<DateTime<Utc>>,

    /// Last command-execution error shown to the user
    #[serde(default)]
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a fresh, not-yet-started session
    pub fn new(persona: PersonaKind, target: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        let session = Self {
            id: SessionId::generate(),
            persona,
            status: SessionStatus::NotStarted,
            attempt: 0,
            scheduled_job_id: None,
            scheduled_notification_ids: Vec::new(),
            window_notice_id: None,
            target: target.into(),
            title: title.into(),
            window_start: None,
            window_end: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        debug!(session_id = %session.id, %persona, "Session::new: created");
        session
    }

    /// Attach a commitment window
    pub fn with_window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.window_start = Some(start);
        self.window_end = Some(end);
        self
    }

    /// Whether the commitment window is open at `now`
    pub fn window_open_at(&self, now: DateTime<Utc>) -> bool {
        match (self.window_start, self.window_end) {
            (Some(start), Some(end)) => start <= now && now < end,
            (Some(start), None) => start <= now,
            _ => true,
        }
    }

    /// Whether the window has already closed at `now`
    pub fn window_closed_at(&self, now: DateTime<Utc>) -> bool {
        self.window_end.is_some_and(|end| end <= now)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

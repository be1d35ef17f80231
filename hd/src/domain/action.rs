//! Structured result of interpreting a free-text reply

use serde::{Deserialize, Serialize};

/// A validated action a Haunter can execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Snooze the next escalation; `minutes` is already clamped
    Postpone { minutes: u32 },
    /// The commitment is resolved
    MarkDone,
    /// Create the commitment (calendar event) at the given time
    CreateEvent { when: String },
    /// Anything that could not be interpreted
    Unknown,
}

impl Action {
    pub fn tag(&self) -> ActionTag {
        match self {
            Self::Postpone { .. } => ActionTag::Postpone,
            Self::MarkDone => ActionTag::MarkDone,
            Self::CreateEvent { .. } => ActionTag::CreateEvent,
            Self::Unknown => ActionTag::Unknown,
        }
    }
}

/// Fieldless discriminant of [`Action`], used for accepted-tag sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTag {
    Postpone,
    MarkDone,
    CreateEvent,
    Unknown,
}

impl ActionTag {
    /// Tags every persona accepts
    pub const BASE: [ActionTag; 3] = [ActionTag::Postpone, ActionTag::MarkDone, ActionTag::Unknown];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postpone => "postpone",
            Self::MarkDone => "mark_done",
            Self::CreateEvent => "create_event",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a classifier tag, accepting common aliases
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "postpone" | "snooze" => Some(Self::Postpone),
            "mark_done" | "done" | "complete" => Some(Self::MarkDone),
            "create_event" | "create" => Some(Self::CreateEvent),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

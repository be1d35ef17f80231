//! Engine-level errors
//!
//! Transport, classifier and executor failures are recovered inside the
//! Haunter and never reach this type. What remains is store failures and
//! broken registry invariants.

use thiserror::Error;

use crate::domain::{JobId, SessionId};
use crate::registry::RegistryError;
use crate::scheduler::SchedulerError;
use crate::state::StateError;

#[derive(Debug, Error)]
pub enum HauntError {
    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Registry invariant violated for job {job_id}: {reason}")]
    InvariantViolation { job_id: JobId, reason: String },

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Invalid session: {0}")]
    InvalidSession(String),
}

impl From<RegistryError> for HauntError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::InvariantViolation { job_id, reason } => HauntError::InvariantViolation { job_id, reason },
            RegistryError::Scheduler(e) => HauntError::Scheduler(e),
        }
    }
}

impl HauntError {
    /// Whether this indicates a programming-contract violation
    pub fn is_fatal(&self) -> bool {
        matches!(self, HauntError::InvariantViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, HauntError>;

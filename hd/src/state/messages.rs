//! State manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{Session, SessionId, SessionStatus};

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    InsertSession {
        session: Session,
        reply: oneshot::Sender<StateResponse<SessionId>>,
    },
    GetSession {
        id: SessionId,
        reply: oneshot::Sender<StateResponse<Option<Session>>>,
    },
    UpdateSession {
        session: Session,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    ListSessions {
        status_filter: Option<SessionStatus>,
        reply: oneshot::Sender<StateResponse<Vec<Session>>>,
    },

    // Shutdown
    Shutdown,
}

//! Command executor for persona actions
//!
//! Persona actions with side effects outside the engine (creating a calendar
//! event) go through this trait. The host supplies the implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Action, Session};

/// Errors from executing a persona action
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Action not supported: {0}")]
    Unsupported(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External system failed: {0}")]
    External(String),
}

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run the action's side effect for this session
    async fn execute(&self, action: &Action, session: &Session) -> Result<(), ExecutorError>;
}

/// Executor for hosts with no persona actions wired up
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExecutor;

#[async_trait]
impl CommandExecutor for NoopExecutor {
    async fn execute(&self, action: &Action, _session: &Session) -> Result<(), ExecutorError> {
        Err(ExecutorError::Unsupported(action.tag().to_string()))
    }
}

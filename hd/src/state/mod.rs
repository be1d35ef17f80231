//! Session persistence
//!
//! The engine only sees [`SessionStore`]; [`StateManager`] is the SQLite
//! implementation.

use async_trait::async_trait;

use crate::domain::{Session, SessionId, SessionStatus};

mod manager;
mod messages;
mod store;

pub use manager::StateManager;
pub use messages::{StateCommand, StateError, StateResponse};

/// CRUD over sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> StateResponse<SessionId>;

    async fn get(&self, id: &SessionId) -> StateResponse<Option<Session>>;

    async fn update(&self, session: Session) -> StateResponse<()>;

    /// All sessions, optionally filtered by status, oldest first
    async fn list(&self, status_filter: Option<SessionStatus>) -> StateResponse<Vec<Session>>;
}

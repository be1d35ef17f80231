//! StateManager actor
//!
//! Owns the session table; callers talk to it through a cloneable handle.

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::SessionStore;
use super::messages::{StateCommand, StateError, StateResponse};
use super::store::SessionTable;
use crate::domain::{Session, SessionId, SessionStatus};

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

impl StateManager {
    /// Spawn a new StateManager actor over a database file
    pub fn spawn(db_path: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(db_path = %db_path.as_ref().display(), "spawn: called");
        let table = SessionTable::open(db_path.as_ref())?;
        Ok(Self::start(table))
    }

    /// Spawn a StateManager over a throwaway in-memory database
    pub fn spawn_in_memory() -> eyre::Result<Self> {
        debug!("spawn_in_memory: called");
        Ok(Self::start(SessionTable::open_in_memory()?))
    }

    fn start(table: SessionTable) -> Self {
        let (tx, rx) = mpsc::channel(256);

        // Spawn the actor task
        tokio::spawn(actor_loop(table, rx));

        info!("StateManager spawned");
        Self { tx }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<StateResponse<T>>) -> StateCommand) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Get a session, failing if absent
    pub async fn get_session_required(&self, id: &SessionId) -> StateResponse<Session> {
        self.get(id)
            .await?
            .ok_or_else(|| StateError::NotFound(id.to_string()))
    }

    /// Stop the actor
    pub async fn shutdown(&self) -> Result<(), StateError> {
        debug!("shutdown: called");
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

#[async_trait]
impl SessionStore for StateManager {
    async fn insert(&self, session: Session) -> StateResponse<SessionId> {
        debug!(session_id = %session.id, persona = %session.persona, "insert: called");
        self.request(|reply| StateCommand::InsertSession { session, reply })
            .await
    }

    async fn get(&self, id: &SessionId) -> StateResponse<Option<Session>> {
        debug!(session_id = %id, "get: called");
        let id = id.clone();
        self.request(|reply| StateCommand::GetSession { id, reply }).await
    }

    async fn update(&self, session: Session) -> StateResponse<()> {
        debug!(session_id = %session.id, status = %session.status, attempt = session.attempt, "update: called");
        self.request(|reply| StateCommand::UpdateSession { session, reply })
            .await
    }

    async fn list(&self, status_filter: Option<SessionStatus>) -> StateResponse<Vec<Session>> {
        debug!(?status_filter, "list: called");
        self.request(|reply| StateCommand::ListSessions { status_filter, reply })
            .await
    }
}

/// The actor loop that owns the table and processes commands
async fn actor_loop(mut table: SessionTable, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("StateManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::InsertSession { session, reply } => {
                debug!(session_id = %session.id, "actor_loop: InsertSession command");
                let _ = reply.send(table.insert(&session));
            }

            StateCommand::GetSession { id, reply } => {
                debug!(session_id = %id, "actor_loop: GetSession command");
                let _ = reply.send(table.get(&id));
            }

            StateCommand::UpdateSession { session, reply } => {
                debug!(session_id = %session.id, "actor_loop: UpdateSession command");
                let result = table.update(&session);
                if let Err(e) = &result {
                    warn!(session_id = %session.id, error = %e, "actor_loop: UpdateSession failed");
                }
                let _ = reply.send(result);
            }

            StateCommand::ListSessions { status_filter, reply } => {
                debug!(?status_filter, "actor_loop: ListSessions command");
                let _ = reply.send(table.list(status_filter));
            }

            StateCommand::Shutdown => {
                debug!("actor_loop: Shutdown command");
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PersonaKind;
    use chrono::Utc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_manager_session_crud() {
        let temp = tempdir().unwrap();
        let manager = StateManager::spawn(temp.path().join("sessions.db")).unwrap();

        // Insert
        let session = Session::new(PersonaKind::Commitment, "chat-1", "Write report", Utc::now());
        let id = manager.insert(session.clone()).await.unwrap();
        assert_eq!(id, session.id);

        // Get
        let retrieved = manager.get(&id).await.unwrap();
        assert_eq!(retrieved.unwrap().title, "Write report");

        // Update
        let mut updated = session.clone();
        updated.status = SessionStatus::InProgress;
        manager.update(updated).await.unwrap();

        let retrieved = manager.get_session_required(&id).await.unwrap();
        assert_eq!(retrieved.status, SessionStatus::InProgress);

        // List
        assert_eq!(manager.list(None).await.unwrap().len(), 1);
        assert!(manager.list(Some(SessionStatus::Complete)).await.unwrap().is_empty());

        // Shutdown
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_state_manager_get_nonexistent() {
        let manager = StateManager::spawn_in_memory().unwrap();

        let missing = SessionId::from("nonexistent");
        assert!(manager.get(&missing).await.unwrap().is_none());
        assert!(matches!(
            manager.get_session_required(&missing).await,
            Err(StateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_state_manager_after_shutdown_reports_channel_error() {
        let manager = StateManager::spawn_in_memory().unwrap();
        manager.shutdown().await.unwrap();

        // Let the actor observe the shutdown
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let result = manager.list(None).await;
        assert!(matches!(result, Err(StateError::ChannelError)));
    }
}

//! SQLite-backed session table
//!
//! Each session is stored as a JSON document plus the columns needed for
//! filtering. Only the actor in [`super::manager`] touches this directly.

use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tracing::debug;

use super::messages::{StateError, StateResponse};
use crate::domain::{Session, SessionId, SessionStatus};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id          TEXT PRIMARY KEY,
    status      TEXT NOT NULL,
    persona     TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    data        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
";

fn store_err(e: rusqlite::Error) -> StateError {
    StateError::StoreError(e.to_string())
}

pub struct SessionTable {
    conn: Connection,
}

impl SessionTable {
    /// Open (or create) the database file, creating parent directories
    pub fn open(path: &Path) -> StateResponse<Self> {
        debug!(path = %path.display(), "SessionTable::open: called");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StateError::StoreError(e.to_string()))?;
        }
        Self::init(Connection::open(path).map_err(store_err)?)
    }

    pub fn open_in_memory() -> StateResponse<Self> {
        debug!("SessionTable::open_in_memory: called");
        Self::init(Connection::open_in_memory().map_err(store_err)?)
    }

    fn init(conn: Connection) -> StateResponse<Self> {
        conn.execute_batch(SCHEMA).map_err(store_err)?;
        Ok(Self { conn })
    }

    fn encode(session: &Session) -> StateResponse<String> {
        serde_json::to_string(session).map_err(|e| StateError::StoreError(e.to_string()))
    }

    fn decode(data: &str) -> StateResponse<Session> {
        serde_json::from_str(data).map_err(|e| StateError::DeserializationError(e.to_string()))
    }

    pub fn insert(&mut self, session: &Session) -> StateResponse<SessionId> {
        debug!(session_id = %session.id, "SessionTable::insert: called");
        let data = Self::encode(session)?;
        let result = self.conn.execute(
            "INSERT INTO sessions (id, status, persona, created_at, updated_at, data) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id.as_str(),
                session.status.as_str(),
                session.persona.as_str(),
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
                data
            ],
        );
        match result {
            Ok(_) => Ok(session.id.clone()),
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
                Err(StateError::AlreadyExists(session.id.to_string()))
            }
            Err(e) => Err(store_err(e)),
        }
    }

    pub fn get(&self, id: &SessionId) -> StateResponse<Option<Session>> {
        debug!(session_id = %id, "SessionTable::get: called");
        let data: Option<String> = self
            .conn
            .query_row("SELECT data FROM sessions WHERE id = ?1", params![id.as_str()], |row| {
                row.get(0)
            })
            .optional()
            .map_err(store_err)?;
        data.as_deref().map(Self::decode).transpose()
    }

    pub fn update(&mut self, session: &Session) -> StateResponse<()> {
        debug!(session_id = %session.id, status = %session.status, "SessionTable::update: called");
        let data = Self::encode(session)?;
        let changed = self
            .conn
            .execute(
                "UPDATE sessions SET status = ?2, persona = ?3, updated_at = ?4, data = ?5 WHERE id = ?1",
                params![
                    session.id.as_str(),
                    session.status.as_str(),
                    session.persona.as_str(),
                    session.updated_at.to_rfc3339(),
                    data
                ],
            )
            .map_err(store_err)?;
        if changed == 0 {
            return Err(StateError::NotFound(session.id.to_string()));
        }
        Ok(())
    }

    pub fn list(&self, status_filter: Option<SessionStatus>) -> StateResponse<Vec<Session>> {
        debug!(?status_filter, "SessionTable::list: called");
        let rows: Vec<String> = match status_filter {
            Some(status) => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT data FROM sessions WHERE status = ?1 ORDER BY created_at, id")
                    .map_err(store_err)?;
                let rows = stmt
                    .query_map(params![status.as_str()], |row| row.get(0))
                    .map_err(store_err)?
                    .collect::<Result<Vec<String>, _>>()
                    .map_err(store_err)?;
                rows
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT data FROM sessions ORDER BY created_at, id")
                    .map_err(store_err)?;
                let rows = stmt
                    .query_map([], |row| row.get(0))
                    .map_err(store_err)?
                    .collect::<Result<Vec<String>, _>>()
                    .map_err(store_err)?;
                rows
            }
        };
        rows.iter().map(|data| Self::decode(data)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PersonaKind;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    fn session(title: &str, offset_secs: i64) -> Session {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        Session::new(PersonaKind::Commitment, "chat-1", title, t0 + Duration::seconds(offset_secs))
    }

    #[test]
    fn test_insert_get_update() {
        let mut table = SessionTable::open_in_memory().unwrap();
        let mut s = session("Write report", 0);

        table.insert(&s).unwrap();
        assert_eq!(table.get(&s.id).unwrap().unwrap(), s);

        s.status = SessionStatus::InProgress;
        s.attempt = 3;
        table.update(&s).unwrap();
        let loaded = table.get(&s.id).unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::InProgress);
        assert_eq!(loaded.attempt, 3);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut table = SessionTable::open_in_memory().unwrap();
        let s = session("Write report", 0);
        table.insert(&s).unwrap();
        assert!(matches!(table.insert(&s), Err(StateError::AlreadyExists(_))));
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let mut table = SessionTable::open_in_memory().unwrap();
        let s = session("Ghost", 0);
        assert!(matches!(table.update(&s), Err(StateError::NotFound(_))));
        assert!(table.get(&s.id).unwrap().is_none());
    }

    #[test]
    fn test_list_filters_by_status_in_creation_order() {
        let mut table = SessionTable::open_in_memory().unwrap();
        let a = session("a", 0);
        let mut b = session("b", 10);
        let c = session("c", 20);
        b.status = SessionStatus::Complete;
        for s in [&a, &b, &c] {
            table.insert(s).unwrap();
        }

        let all: Vec<String> = table.list(None).unwrap().into_iter().map(|s| s.title).collect();
        assert_eq!(all, vec!["a", "b", "c"]);

        let open = table.list(Some(SessionStatus::NotStarted)).unwrap();
        assert_eq!(open.len(), 2);
        assert_eq!(table.list(Some(SessionStatus::Complete)).unwrap()[0].id, b.id);
    }

    #[test]
    fn test_file_backed_survives_reopen() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("sessions.db");
        let s = session("Persist me", 0);

        {
            let mut table = SessionTable::open(&path).unwrap();
            table.insert(&s).unwrap();
        }

        let table = SessionTable::open(&path).unwrap();
        assert_eq!(table.get(&s.id).unwrap().unwrap().title, "Persist me");
    }
}

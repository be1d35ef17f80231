//! Integration tests for Haunter
//!
//! Full stack on real tokio timers (paused), the SQLite-backed StateManager
//! and in-file doubles for the host-provided transport and classifier.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;

use haunter::config::Config;
use haunter::domain::{NotificationHandle, PersonaKind, SessionStatus};
use haunter::executor::NoopExecutor;
use haunter::haunter::{Collaborators, HauntManager};
use haunter::intent::{ClassifierContext, ClassifierError, IntentClassifier, RawIntent};
use haunter::recovery::recover;
use haunter::scheduler::{Clock, TokioScheduler};
use haunter::state::{SessionStore, StateManager};
use haunter::transport::{Notification, NotificationTransport, TransportError};
use tempfile::TempDir;

// =============================================================================
// Doubles
// =============================================================================

/// Wall time that follows tokio's (paused) clock
struct TokioClock {
    base: DateTime<Utc>,
    started: Instant,
}

impl TokioClock {
    fn new() -> Self {
        Self {
            base: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
            started: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::from_std(self.started.elapsed()).unwrap()
    }
}

#[derive(Default)]
struct ChatTransport {
    sent: Mutex<Vec<Notification>>,
    scheduled: Mutex<Vec<(Notification, DateTime<Utc>)>>,
    cancelled: Mutex<Vec<NotificationHandle>>,
}

impl ChatTransport {
    async fn sent(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Handles are unique across transports, like real chat message ids
    fn handle(&self) -> NotificationHandle {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        NotificationHandle::new(format!("chat-msg-{}", NEXT.fetch_add(1, Ordering::SeqCst)))
    }
}

#[async_trait]
impl NotificationTransport for ChatTransport {
    async fn send(&self, _target: &str, notification: &Notification) -> Result<NotificationHandle, TransportError> {
        let handle = self.handle();
        self.sent.lock().await.push(notification.clone());
        Ok(handle)
    }

    async fn schedule(
        &self,
        _target: &str,
        notification: &Notification,
        at: DateTime<Utc>,
    ) -> Result<NotificationHandle, TransportError> {
        let handle = self.handle();
        self.scheduled.lock().await.push((notification.clone(), at));
        Ok(handle)
    }

    async fn cancel(&self, handle: &NotificationHandle) -> Result<(), TransportError> {
        self.cancelled.lock().await.push(handle.clone());
        Ok(())
    }
}

/// Understands exactly two replies
struct KeywordClassifier;

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify_free_text(&self, text: &str, _context: &ClassifierContext) -> Result<RawIntent, ClassifierError> {
        match text.trim() {
            "done" => Ok(RawIntent::new("mark_done")),
            "later" => Ok(RawIntent::new("postpone").with_minutes(60)),
            other => Err(ClassifierError::Malformed(other.to_string())),
        }
    }
}

struct Stack {
    manager: HauntManager,
    scheduler: Arc<TokioScheduler>,
    transport: Arc<ChatTransport>,
}

fn stack(store: StateManager) -> Stack {
    let clock = Arc::new(TokioClock::new());
    let scheduler = Arc::new(TokioScheduler::with_clock(clock.clone()));
    let transport = Arc::new(ChatTransport::default());

    let manager = HauntManager::new(
        Collaborators {
            store: Arc::new(store),
            transport: transport.clone(),
            classifier: Arc::new(KeywordClassifier),
            executor: Arc::new(NoopExecutor),
            engine: scheduler.clone(),
            clock,
        },
        &Config::default(),
    );
    Stack {
        manager,
        scheduler,
        transport,
    }
}

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

// =============================================================================
// Escalation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_follow_ups_fire_until_done() {
    let s = stack(StateManager::spawn_in_memory().unwrap());
    let id = s
        .manager
        .create_session(PersonaKind::Commitment, "chat-1", "Write report")
        .await
        .unwrap()
        .id;
    s.manager.haunter(&id).start().await.unwrap();
    assert_eq!(s.transport.sent().await, 1);

    // 5 then 10 minutes on the Commitment curve
    tokio::time::sleep(minutes(5) + Duration::from_secs(1)).await;
    assert_eq!(s.transport.sent().await, 2);
    tokio::time::sleep(minutes(10)).await;
    assert_eq!(s.transport.sent().await, 3);

    let action = s.manager.handle_reply(&id, "done").await.unwrap();
    assert_eq!(action, haunter::Action::MarkDone);

    let session = s.manager.store().get(&id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Complete);
    assert_eq!(session.attempt, 2);
    assert!(s.scheduler.is_empty().await);
    assert_eq!(s.transport.cancelled.lock().await.len(), 1);

    // Nothing left to fire
    tokio::time::sleep(minutes(240)).await;
    assert_eq!(s.transport.sent().await, 3);
}

#[tokio::test(start_paused = true)]
async fn test_postpone_delays_next_round() {
    let s = stack(StateManager::spawn_in_memory().unwrap());
    let id = s
        .manager
        .create_session(PersonaKind::Commitment, "chat-1", "Stretch")
        .await
        .unwrap()
        .id;
    s.manager.haunter(&id).start().await.unwrap();

    s.manager.handle_reply(&id, "later").await.unwrap();
    tokio::time::sleep(minutes(59)).await;
    assert_eq!(s.transport.sent().await, 1);
    tokio::time::sleep(minutes(2)).await;
    assert_eq!(s.transport.sent().await, 2);
}

// =============================================================================
// Commitment windows
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_window_open_then_close_without_done() {
    let s = stack(StateManager::spawn_in_memory().unwrap());
    let now = s.manager.now();
    let id = s
        .manager
        .create_commitment("chat-1", "Deep work", now + chrono::Duration::minutes(30), now + chrono::Duration::minutes(60))
        .await
        .unwrap()
        .id;
    assert_eq!(s.transport.scheduled.lock().await.len(), 1);
    assert_eq!(s.transport.sent().await, 0);

    tokio::time::sleep(minutes(31)).await;
    let session = s.manager.store().get(&id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::InProgress);
    assert_eq!(s.transport.sent().await, 0);

    // Follow-ups at +35 and +45, window closes at +60
    tokio::time::sleep(minutes(30)).await;
    let session = s.manager.store().get(&id).await.unwrap().unwrap();
    assert_eq!(session.persona, PersonaKind::Incomplete);
    assert_eq!(session.attempt, 2);

    let sent = s.transport.sent.lock().await;
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[2].persona, PersonaKind::Incomplete);
}

// =============================================================================
// Restart
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_restart_resumes_from_store() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("sessions.db");

    let first = stack(StateManager::spawn(&db_path).unwrap());
    let id = first
        .manager
        .create_session(PersonaKind::Commitment, "chat-1", "Write report")
        .await
        .unwrap()
        .id;
    first.manager.haunter(&id).start().await.unwrap();
    first.scheduler.shutdown().await;

    let second = stack(StateManager::spawn(&db_path).unwrap());
    let stats = recover(&second.manager).await.unwrap();
    assert_eq!(stats.resumed, 1);
    assert_eq!(second.transport.sent().await, 0);

    tokio::time::sleep(minutes(5) + Duration::from_secs(1)).await;
    assert_eq!(second.transport.sent().await, 1);
    let session = second.manager.store().get(&id).await.unwrap().unwrap();
    assert_eq!(session.attempt, 1);
    assert_eq!(session.scheduled_notification_ids.len(), 1);
}

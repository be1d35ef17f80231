//! Test wiring: a manager over in-memory doubles and a hand-cranked clock

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::{Collaborators, HauntManager};
use crate::config::Config;
use crate::domain::{JobId, JobKind, Session, SessionId};
use crate::executor::mock::MockExecutor;
use crate::intent::RawIntent;
use crate::intent::classifier::mock::MockClassifier;
use crate::scheduler::mock::{ManualClock, ManualScheduler};
use crate::state::StateManager;
use crate::transport::mock::RecordingTransport;

pub(crate) struct Harness {
    pub manager: HauntManager,
    pub scheduler: Arc<ManualScheduler>,
    pub transport: Arc<RecordingTransport>,
    pub classifier: Arc<MockClassifier>,
    pub executor: Arc<MockExecutor>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_store(config, StateManager::spawn_in_memory().unwrap())
    }

    /// Fresh doubles over an existing store (simulates a restart)
    pub fn with_store(config: Config, store: StateManager) -> Self {
        let scheduler = Arc::new(ManualScheduler::new());
        let transport = Arc::new(RecordingTransport::new());
        let classifier = Arc::new(MockClassifier::failing());
        let executor = Arc::new(MockExecutor::new());
        let clock = Arc::new(ManualClock::new(Self::t0()));

        let manager = HauntManager::new(
            Collaborators {
                store: Arc::new(store),
                transport: transport.clone(),
                classifier: classifier.clone(),
                executor: executor.clone(),
                engine: scheduler.clone(),
                clock: clock.clone(),
            },
            &config,
        );

        Self {
            manager,
            scheduler,
            transport,
            classifier,
            executor,
            clock,
        }
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.clock.advance(Duration::minutes(minutes));
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.manager.now()
    }

    pub fn reply_means(&self, raw: RawIntent) {
        self.classifier.set(raw);
    }

    pub async fn session(&self, id: &SessionId) -> Session {
        self.manager.store().get(id).await.unwrap().unwrap()
    }

    pub async fn fire(&self, id: &SessionId, kind: JobKind) -> bool {
        self.scheduler.fire(&JobId::for_session(id, kind)).await
    }

    pub async fn due(&self, id: &SessionId, kind: JobKind) -> Option<DateTime<Utc>> {
        self.scheduler.run_at(&JobId::for_session(id, kind)).await
    }
}

//! HauntManager - host-facing entry point
//!
//! Owns the shared context and turns host triggers (new commitment, reply,
//! daily cron) into Haunter transitions.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};

use super::machine::{HauntContext, Haunter};
use super::persona::Persona;
use crate::config::{BootstrapConfig, Config};
use crate::domain::{Action, JobId, JobKind, PersonaKind, Session, SessionId, SessionStatus};
use crate::error::{HauntError, Result};
use crate::executor::CommandExecutor;
use crate::intent::{IntentClassifier, IntentRouter};
use crate::registry::{JobRegistry, NotificationCorrelator};
use crate::scheduler::{Clock, JobCallback, SchedulingEngine};
use crate::state::SessionStore;
use crate::transport::NotificationTransport;

/// Registry key for the process-wide daily bootstrap job
const DAILY_BOOTSTRAP_KEY: &str = "daily-bootstrap";

/// External collaborators supplied by the host process
pub struct Collaborators {
    pub store: Arc<dyn SessionStore>,
    pub transport: Arc<dyn NotificationTransport>,
    pub classifier: Arc<dyn IntentClassifier>,
    pub executor: Arc<dyn CommandExecutor>,
    pub engine: Arc<dyn SchedulingEngine>,
    pub clock: Arc<dyn Clock>,
}

/// Cloneable handle over every session's Haunter
#[derive(Clone)]
pub struct HauntManager {
    ctx: Arc<HauntContext>,
    bootstrap: Arc<BootstrapConfig>,
}

impl HauntManager {
    pub fn new(collaborators: Collaborators, config: &Config) -> Self {
        debug!("HauntManager::new: called");
        let Collaborators {
            store,
            transport,
            classifier,
            executor,
            engine,
            clock,
        } = collaborators;

        let ctx = HauntContext::new(
            store,
            transport,
            IntentRouter::new(classifier),
            executor,
            JobRegistry::new(engine),
            clock,
            &config.personas,
        );
        Self {
            ctx: Arc::new(ctx),
            bootstrap: Arc::new(config.bootstrap.clone()),
        }
    }

    pub fn haunter(&self, session_id: &SessionId) -> Haunter {
        Haunter::new(session_id.clone(), Arc::clone(&self.ctx))
    }

    pub fn persona(&self, kind: PersonaKind) -> &Persona {
        self.ctx.persona(kind)
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.ctx.store
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.ctx.jobs
    }

    pub fn notifications(&self) -> &NotificationCorrelator {
        &self.ctx.notifications
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.ctx.clock.now()
    }

    /// Persist a new session (not yet started)
    pub async fn create_session(
        &self,
        persona: PersonaKind,
        target: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Session> {
        let session = Session::new(persona, target, title, self.now());
        debug!(session_id = %session.id, %persona, "HauntManager::create_session: called");
        self.ctx.store.insert(session.clone()).await?;
        Ok(session)
    }

    /// Track a new commitment and arm its window
    pub async fn create_commitment(
        &self,
        target: impl Into<String>,
        title: impl Into<String>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Session> {
        debug!(%window_start, %window_end, "HauntManager::create_commitment: called");
        if window_end <= window_start {
            return Err(HauntError::InvalidSession(format!(
                "window ends ({}) before it starts ({})",
                window_end, window_start
            )));
        }
        let session =
            Session::new(PersonaKind::Commitment, target, title, self.now()).with_window(window_start, window_end);
        self.ctx.store.insert(session.clone()).await?;
        info!(session_id = %session.id, %window_start, "Commitment tracked");
        self.arm_commitment(&session.id).await
    }

    /// Schedule the window notice and open/close jobs for a commitment
    pub async fn arm_commitment(&self, session_id: &SessionId) -> Result<Session> {
        debug!(%session_id, "HauntManager::arm_commitment: called");
        self.haunter(session_id).arm().await
    }

    /// Route a user reply to its session
    pub async fn handle_reply(&self, session_id: &SessionId, text: &str) -> Result<Action> {
        debug!(%session_id, "HauntManager::handle_reply: called");
        self.haunter(session_id).handle_reply(text).await
    }

    pub async fn commitment_cancelled(&self, session_id: &SessionId) -> Result<Session> {
        self.haunter(session_id).commitment_cancelled().await
    }

    pub async fn mark_complete(&self, session_id: &SessionId) -> Result<Session> {
        self.haunter(session_id).mark_complete().await
    }

    pub async fn recommit(
        &self,
        session_id: &SessionId,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Session> {
        self.haunter(session_id).recommit(window_start, window_end).await
    }

    // === Daily bootstrap ===

    /// Next run of the daily check strictly after `now`
    pub fn next_bootstrap_at(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let time = self
            .bootstrap
            .daily_time()
            .map_err(|e| HauntError::InvalidSession(e.to_string()))?;
        let today = now.date_naive().and_time(time).and_utc();
        Ok(if today > now { today } else { today + Duration::days(1) })
    }

    /// Schedule the daily bootstrap check (replacing any pending one)
    pub async fn schedule_daily_bootstrap(&self) -> Result<JobId> {
        let run_at = self.next_bootstrap_at(self.now())?;
        debug!(%run_at, "HauntManager::schedule_daily_bootstrap: called");
        let key = SessionId::from(DAILY_BOOTSTRAP_KEY);
        let job_id = self
            .ctx
            .jobs
            .schedule(&key, JobKind::DailyBootstrap, run_at, self.daily_callback())
            .await?;
        info!(%run_at, "Daily bootstrap check scheduled");
        Ok(job_id)
    }

    /// Run the bootstrap check now
    ///
    /// Creates and starts a Bootstrap session unless a commitment already
    /// covers the lookahead window or a bootstrap session is still open.
    pub async fn run_bootstrap_check(&self) -> Result<Option<Session>> {
        let now = self.now();
        let horizon = now + Duration::hours(i64::from(self.bootstrap.lookahead_hours));
        debug!(%now, %horizon, "HauntManager::run_bootstrap_check: called");

        let sessions = self.ctx.store.list(None).await?;
        let pending_bootstrap = sessions
            .iter()
            .any(|s| s.persona == PersonaKind::Bootstrap && !s.status.is_terminal());
        if pending_bootstrap {
            debug!("Bootstrap session already open, skipping");
            return Ok(None);
        }

        let covered = sessions.iter().any(|s| {
            s.status != SessionStatus::Cancelled
                && s.window_start.is_some_and(|start| start <= horizon)
                && s.window_end.is_none_or(|end| end > now)
        });
        if covered {
            debug!("Commitment exists within lookahead window, skipping");
            return Ok(None);
        }

        let session = self
            .create_session(PersonaKind::Bootstrap, self.bootstrap.target.clone(), "Plan the day")
            .await?;
        info!(session_id = %session.id, "No upcoming commitment, starting bootstrap");
        self.haunter(&session.id).start().await.map(Some)
    }

    fn daily_callback(&self) -> JobCallback {
        let ctx = Arc::downgrade(&self.ctx);
        let bootstrap = Arc::clone(&self.bootstrap);
        Box::new(move || Box::pin(run_daily(ctx, bootstrap)))
    }
}

async fn run_daily(ctx: Weak<HauntContext>, bootstrap: Arc<BootstrapConfig>) {
    let Some(ctx) = ctx.upgrade() else {
        debug!("Daily bootstrap fired after shutdown, ignoring");
        return;
    };
    let manager = HauntManager { ctx, bootstrap };
    if let Err(e) = manager.run_bootstrap_check().await {
        error!(error = %e, "Daily bootstrap check failed");
    }
    if let Err(e) = manager.schedule_daily_bootstrap().await {
        error!(error = %e, "Failed to reschedule daily bootstrap check");
    }
}

//! Haunter - the per-session escalation state machine
//!
//! A `Haunter` is a cheap handle (session id + shared context). Every
//! transition takes the session's gate, reloads the session, persists the new
//! state and only then issues side effects (send, schedule, cancel).

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::persona::Persona;
use crate::config::PersonasConfig;
use crate::domain::{Action, JobKind, NotificationHandle, PersonaKind, Session, SessionId, SessionStatus};
use crate::error::{HauntError, Result};
use crate::executor::CommandExecutor;
use crate::intent::{ClassifierContext, IntentRouter};
use crate::registry::{JobRegistry, NotificationCorrelator};
use crate::scheduler::{Clock, JobCallback};
use crate::state::SessionStore;
use crate::transport::{NotificationKind, NotificationTransport};

/// Everything the Haunters of one process share
pub struct HauntContext {
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) transport: Arc<dyn NotificationTransport>,
    pub(crate) router: IntentRouter,
    pub(crate) executor: Arc<dyn CommandExecutor>,
    pub(crate) jobs: JobRegistry,
    pub(crate) notifications: NotificationCorrelator,
    pub(crate) clock: Arc<dyn Clock>,
    bootstrap: Persona,
    commitment: Persona,
    incomplete: Persona,
    gates: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl HauntContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        store: Arc<dyn SessionStore>,
        transport: Arc<dyn NotificationTransport>,
        router: IntentRouter,
        executor: Arc<dyn CommandExecutor>,
        jobs: JobRegistry,
        clock: Arc<dyn Clock>,
        personas: &PersonasConfig,
    ) -> Self {
        Self {
            store,
            transport,
            router,
            executor,
            jobs,
            notifications: NotificationCorrelator::new(),
            clock,
            bootstrap: Persona::from_config(PersonaKind::Bootstrap, &personas.bootstrap),
            commitment: Persona::from_config(PersonaKind::Commitment, &personas.commitment),
            incomplete: Persona::from_config(PersonaKind::Incomplete, &personas.incomplete),
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn persona(&self, kind: PersonaKind) -> &Persona {
        match kind {
            PersonaKind::Bootstrap => &self.bootstrap,
            PersonaKind::Commitment => &self.commitment,
            PersonaKind::Incomplete => &self.incomplete,
        }
    }

    /// Per-session gate; entries nobody holds or waits on are pruned here
    async fn gate(&self, session_id: &SessionId) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock().await;
        gates.retain(|_, gate| Arc::strong_count(gate) > 1);
        Arc::clone(gates.entry(session_id.clone()).or_default())
    }
}

/// Handle to one session's state machine
#[derive(Clone)]
pub struct Haunter {
    session_id: SessionId,
    ctx: Arc<HauntContext>,
}

impl Haunter {
    pub(crate) fn new(session_id: SessionId, ctx: Arc<HauntContext>) -> Self {
        Self { session_id, ctx }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Current persisted session
    pub async fn session(&self) -> Result<Session> {
        self.load().await
    }

    // === Triggers ===

    /// Begin escalating: first notification (unless one is outstanding) and a follow-up
    ///
    /// Safe to call repeatedly; the follow-up job is replaced, never duplicated.
    pub async fn start(&self) -> Result<Session> {
        debug!(session_id = %self.session_id, "Haunter::start: called");
        let _gate = self.lock().await;
        let mut session = self.load().await?;
        if session.status.is_terminal() {
            debug!(session_id = %session.id, "Haunter::start: session complete, ignoring");
            return Ok(session);
        }

        if session.status == SessionStatus::NotStarted {
            session.status = SessionStatus::InProgress;
            self.persist(&mut session).await?;
            info!(session_id = %session.id, persona = %session.persona, "Session started");
        }

        if self.ctx.notifications.has_outstanding(&session.id).await {
            debug!(session_id = %session.id, "Haunter::start: notification already outstanding, not resending");
        } else {
            self.notify(&mut session, NotificationKind::Reminder, None).await;
        }

        let delay = self.ctx.persona(session.persona).backoff.delay(session.attempt);
        self.schedule_follow_up(&mut session, delay).await?;
        self.persist(&mut session).await?;
        Ok(session)
    }

    /// A follow-up job fired: escalate one round
    ///
    /// Skipped if the follow-up was rescheduled between firing and taking the
    /// session gate.
    pub async fn on_follow_up(&self) -> Result<Session> {
        debug!(session_id = %self.session_id, "Haunter::on_follow_up: called");
        let _gate = self.lock().await;
        let mut session = self.load().await?;
        if session.status.is_terminal() {
            debug!(session_id = %session.id, "Haunter::on_follow_up: session complete, ignoring");
            return Ok(session);
        }
        if self.ctx.jobs.job_id(&session.id, JobKind::FollowUp).await.is_some() {
            debug!(session_id = %session.id, "Haunter::on_follow_up: superseded by a newer follow-up");
            return Ok(session);
        }

        session.attempt = session.attempt.saturating_add(1);
        session.scheduled_job_id = None;
        self.persist(&mut session).await?;

        let kind = match session.status {
            SessionStatus::Cancelled => NotificationKind::CancelledReminder,
            _ => NotificationKind::Reminder,
        };
        self.notify(&mut session, kind, None).await;

        let delay = self.ctx.persona(session.persona).backoff.delay(session.attempt);
        self.schedule_follow_up(&mut session, delay).await?;
        self.persist(&mut session).await?;
        info!(
            session_id = %session.id,
            attempt = session.attempt,
            next_in_minutes = delay.num_minutes(),
            "Escalated"
        );
        Ok(session)
    }

    /// Classify a free-text reply and act on it
    ///
    /// Replies to a completed session are ignored without calling the classifier.
    pub async fn handle_reply(&self, text: &str) -> Result<Action> {
        debug!(session_id = %self.session_id, text_len = text.len(), "Haunter::handle_reply: called");
        let _gate = self.lock().await;
        let mut session = self.load().await?;
        if session.status.is_terminal() {
            debug!(session_id = %session.id, "Haunter::handle_reply: session complete, ignoring");
            return Ok(Action::Unknown);
        }

        let persona = self.ctx.persona(session.persona);
        let context = ClassifierContext {
            persona: persona.kind,
            title: session.title.clone(),
            accepted_tags: persona.accepted_tags.clone(),
            now: self.ctx.clock.now(),
        };
        let action = self.ctx.router.classify(text, &context, persona.postpone).await;
        info!(session_id = %session.id, action = %action.tag(), "Reply classified");

        self.apply_locked(&mut session, action.clone()).await?;
        Ok(action)
    }

    /// Act on an already-structured action (buttons, commands)
    ///
    /// Actions outside the persona's accepted set are treated as unknown.
    pub async fn apply_action(&self, action: Action) -> Result<Session> {
        debug!(session_id = %self.session_id, action = %action.tag(), "Haunter::apply_action: called");
        let _gate = self.lock().await;
        let mut session = self.load().await?;
        if session.status.is_terminal() {
            debug!(session_id = %session.id, "Haunter::apply_action: session complete, ignoring");
            return Ok(session);
        }

        let persona = self.ctx.persona(session.persona);
        let action = match action {
            action if !persona.accepts(action.tag()) => {
                debug!(session_id = %session.id, action = %action.tag(), "Action not accepted by persona");
                Action::Unknown
            }
            Action::Postpone { minutes } => Action::Postpone {
                minutes: persona.postpone.clamp(Some(i64::from(minutes))),
            },
            other => other,
        };
        self.apply_locked(&mut session, action).await?;
        Ok(session)
    }

    /// The underlying commitment was cancelled externally
    ///
    /// The session becomes `Cancelled` and keeps escalating; only `mark_done`
    /// or a successful persona action ends it.
    pub async fn commitment_cancelled(&self) -> Result<Session> {
        debug!(session_id = %self.session_id, "Haunter::commitment_cancelled: called");
        let _gate = self.lock().await;
        let mut session = self.load().await?;
        if session.status.is_terminal() || session.status == SessionStatus::Cancelled {
            debug!(session_id = %session.id, status = %session.status, "Haunter::commitment_cancelled: ignoring");
            return Ok(session);
        }

        for kind in [JobKind::FollowUp, JobKind::WindowOpen, JobKind::WindowClose] {
            self.ctx.jobs.cancel(&session.id, kind).await;
        }
        let notice = self.pending_notice(&session);
        if let Some(notice) = &notice {
            session.scheduled_notification_ids.retain(|h| h != notice);
        }
        session.window_notice_id = None;
        session.status = SessionStatus::Cancelled;
        session.scheduled_job_id = None;
        self.persist(&mut session).await?;
        info!(session_id = %session.id, "Commitment cancelled, still haunting");

        if let Some(notice) = notice {
            if let Err(e) = self.ctx.transport.cancel(&notice).await {
                warn!(session_id = %session.id, handle = %notice, error = %e, "Failed to cancel window notice");
            }
            self.sync_handles(&session).await;
        }

        self.notify(&mut session, NotificationKind::CancelledReminder, None)
            .await;
        let delay = self.ctx.persona(session.persona).backoff.delay(session.attempt);
        self.schedule_follow_up(&mut session, delay).await?;
        self.persist(&mut session).await?;
        Ok(session)
    }

    /// External "it's done" signal
    pub async fn mark_complete(&self) -> Result<Session> {
        debug!(session_id = %self.session_id, "Haunter::mark_complete: called");
        let _gate = self.lock().await;
        let mut session = self.load().await?;
        if session.status.is_terminal() {
            return Ok(session);
        }
        self.complete(&mut session).await?;
        Ok(session)
    }

    /// A new commitment replaces the old one for this slot
    ///
    /// Clears all jobs and notifications, resets the attempt counter and arms
    /// the new window.
    pub async fn recommit(&self, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Result<Session> {
        debug!(session_id = %self.session_id, %window_start, %window_end, "Haunter::recommit: called");
        if window_end <= window_start {
            return Err(HauntError::InvalidSession(format!(
                "window ends ({}) before it starts ({})",
                window_end, window_start
            )));
        }

        {
            let _gate = self.lock().await;
            let mut session = self.load().await?;

            session.attempt = 0;
            session.status = SessionStatus::NotStarted;
            session.persona = PersonaKind::Commitment;
            session.window_start = Some(window_start);
            session.window_end = Some(window_end);
            session.last_error = None;
            session.scheduled_job_id = None;
            session.scheduled_notification_ids.clear();
            session.window_notice_id = None;
            self.persist(&mut session).await?;

            self.clear_side_effects(&session.id).await;
            info!(session_id = %session.id, %window_start, "Recommitted");
        }

        self.arm().await
    }

    /// Arm a commitment's window: pre-scheduled notice plus open/close jobs
    ///
    /// Starts immediately if the window is already open, and escalates as
    /// Incomplete if it has already closed.
    pub async fn arm(&self) -> Result<Session> {
        debug!(session_id = %self.session_id, "Haunter::arm: called");
        let now = self.ctx.clock.now();
        let session = {
            let _gate = self.lock().await;
            let mut session = self.load().await?;
            if session.status.is_terminal() {
                return Ok(session);
            }
            let Some(start) = session.window_start else {
                return Err(HauntError::InvalidSession(format!("session {} has no window", session.id)));
            };

            if start > now {
                if !self.ctx.notifications.has_outstanding(&session.id).await {
                    self.schedule_notice(&mut session, start).await;
                }
                self.ctx
                    .jobs
                    .schedule(&session.id, JobKind::WindowOpen, start, self.callback(JobKind::WindowOpen))
                    .await?;
            }
            if let Some(end) = session.window_end.filter(|end| *end > now) {
                self.ctx
                    .jobs
                    .schedule(&session.id, JobKind::WindowClose, end, self.callback(JobKind::WindowClose))
                    .await?;
            }
            self.persist(&mut session).await?;
            debug!(session_id = %session.id, %start, "Haunter::arm: window armed");
            session
        };

        if session.window_closed_at(now) {
            self.window_closed().await
        } else if session.window_open_at(now) && session.status == SessionStatus::NotStarted {
            self.start().await
        } else {
            Ok(session)
        }
    }

    /// WindowOpen job fired
    pub async fn window_opened(&self) -> Result<Session> {
        debug!(session_id = %self.session_id, "Haunter::window_opened: called");
        self.start().await
    }

    /// WindowClose job fired: an unfinished commitment becomes Incomplete
    pub async fn window_closed(&self) -> Result<Session> {
        debug!(session_id = %self.session_id, "Haunter::window_closed: called");
        let _gate = self.lock().await;
        let mut session = self.load().await?;
        if session.status.is_terminal() || session.persona != PersonaKind::Commitment {
            debug!(session_id = %session.id, persona = %session.persona, "Haunter::window_closed: ignoring");
            return Ok(session);
        }

        self.ctx.jobs.cancel(&session.id, JobKind::FollowUp).await;
        self.ctx.jobs.cancel(&session.id, JobKind::WindowOpen).await;
        session.persona = PersonaKind::Incomplete;
        if session.status == SessionStatus::NotStarted {
            session.status = SessionStatus::InProgress;
        }
        session.scheduled_job_id = None;
        self.persist(&mut session).await?;
        info!(session_id = %session.id, attempt = session.attempt, "Window closed without completion");

        self.notify(&mut session, NotificationKind::Reminder, None).await;
        let delay = self.ctx.persona(session.persona).backoff.delay(session.attempt);
        self.schedule_follow_up(&mut session, delay).await?;
        self.persist(&mut session).await?;
        Ok(session)
    }

    /// Re-derive the follow-up after a restart
    ///
    /// Restores the correlator from the persisted handles and schedules the
    /// next round at now + backoff(attempt), without sending anything.
    pub async fn resume(&self) -> Result<Session> {
        debug!(session_id = %self.session_id, "Haunter::resume: called");
        let _gate = self.lock().await;
        let mut session = self.load().await?;
        if session.status.is_terminal() {
            return Ok(session);
        }

        self.ctx
            .notifications
            .restore(&session.id, session.scheduled_notification_ids.clone())
            .await;

        let now = self.ctx.clock.now();
        let pending_close = session.window_end.filter(|end| *end > now);
        if let (PersonaKind::Commitment, Some(end)) = (session.persona, pending_close) {
            self.ctx
                .jobs
                .schedule(&session.id, JobKind::WindowClose, end, self.callback(JobKind::WindowClose))
                .await?;
        }

        let delay = self.ctx.persona(session.persona).backoff.delay(session.attempt);
        self.schedule_follow_up(&mut session, delay).await?;
        self.persist(&mut session).await?;
        info!(session_id = %session.id, attempt = session.attempt, "Resumed escalation");
        Ok(session)
    }

    // === Internals (gate held) ===

    async fn lock(&self) -> OwnedMutexGuard<()> {
        self.ctx.gate(&self.session_id).await.lock_owned().await
    }

    async fn load(&self) -> Result<Session> {
        self.ctx
            .store
            .get(&self.session_id)
            .await?
            .ok_or_else(|| HauntError::SessionNotFound(self.session_id.clone()))
    }

    async fn persist(&self, session: &mut Session) -> Result<()> {
        session.touch(self.ctx.clock.now());
        self.ctx.store.update(session.clone()).await?;
        Ok(())
    }

    async fn apply_locked(&self, session: &mut Session, action: Action) -> Result<()> {
        let persona = self.ctx.persona(session.persona);
        match action {
            Action::MarkDone => self.complete(session).await,

            Action::Postpone { minutes } => {
                let minutes = minutes.clamp(1, persona.postpone.max_minutes.max(1));
                self.schedule_follow_up(session, Duration::minutes(i64::from(minutes)))
                    .await?;
                self.persist(session).await?;
                info!(session_id = %session.id, minutes, attempt = session.attempt, "Postponed");
                Ok(())
            }

            Action::CreateEvent { .. } => match self.ctx.executor.execute(&action, session).await {
                Ok(()) => {
                    session.last_error = None;
                    self.complete(session).await
                }
                Err(e) => {
                    warn!(session_id = %session.id, error = %e, "Persona action failed, session stays open");
                    let detail = e.to_string();
                    session.last_error = Some(detail.clone());
                    self.persist(session).await?;
                    self.notify(session, NotificationKind::ActionFailed, Some(&detail)).await;
                    self.persist(session).await
                }
            },

            Action::Unknown => {
                debug!(session_id = %session.id, "Unknown reply, no state change");
                if persona.reprompt_on_unknown {
                    let reprompt = persona.compose(session, NotificationKind::Reprompt, None);
                    if let Err(e) = self.ctx.transport.send(&session.target, &reprompt).await {
                        warn!(session_id = %session.id, error = %e, "Failed to send reprompt");
                    }
                }
                Ok(())
            }
        }
    }

    /// Terminal transition: persist Complete, then cancel every job and notification
    async fn complete(&self, session: &mut Session) -> Result<()> {
        session.status = SessionStatus::Complete;
        self.persist(session).await?;

        let (jobs, notifications) = self.clear_side_effects(&session.id).await;
        session.scheduled_job_id = None;
        session.scheduled_notification_ids.clear();
        session.window_notice_id = None;
        self.persist(session).await?;
        info!(
            session_id = %session.id,
            jobs_cancelled = jobs,
            notifications_cancelled = notifications,
            "Session complete"
        );
        Ok(())
    }

    /// Cancel all jobs and outstanding notifications; returns (jobs, notifications)
    async fn clear_side_effects(&self, session_id: &SessionId) -> (usize, usize) {
        let jobs = self.ctx.jobs.cancel_all(session_id).await;
        let transport = Arc::clone(&self.ctx.transport);
        let report = self
            .ctx
            .notifications
            .cancel_all(session_id, |handle| {
                let transport = Arc::clone(&transport);
                async move { transport.cancel(&handle).await }
            })
            .await;
        (jobs, report.cancelled)
    }

    /// Send and record a notification; failures are logged and left to the next round
    async fn notify(
        &self,
        session: &mut Session,
        kind: NotificationKind,
        detail: Option<&str>,
    ) -> Option<NotificationHandle> {
        let notification = self.ctx.persona(session.persona).compose(session, kind, detail);
        match self.ctx.transport.send(&session.target, &notification).await {
            Ok(handle) => {
                debug!(session_id = %session.id, %handle, tone = ?notification.tone, "Notification sent");
                self.track_sent(session, handle.clone()).await;
                Some(handle)
            }
            Err(e) => {
                warn!(
                    session_id = %session.id,
                    attempt = session.attempt,
                    error = %e,
                    "Notification send failed, next escalation will retry"
                );
                None
            }
        }
    }

    /// Pre-schedule the window-open notice with the transport
    async fn schedule_notice(&self, session: &mut Session, at: DateTime<Utc>) {
        let notification = self
            .ctx
            .persona(session.persona)
            .compose(session, NotificationKind::Reminder, None);
        match self.ctx.transport.schedule(&session.target, &notification, at).await {
            Ok(handle) => {
                debug!(session_id = %session.id, %handle, %at, "Window notice scheduled");
                session.window_notice_id = Some(handle.clone());
                if !session.scheduled_notification_ids.contains(&handle) {
                    session.scheduled_notification_ids.push(handle);
                }
                self.sync_handles(session).await;
            }
            Err(e) => warn!(session_id = %session.id, error = %e, "Failed to schedule window notice"),
        }
    }

    /// The pre-scheduled window notice, if its window has not opened yet
    fn pending_notice(&self, session: &Session) -> Option<NotificationHandle> {
        let now = self.ctx.clock.now();
        session
            .window_notice_id
            .clone()
            .filter(|_| session.window_start.is_some_and(|start| start > now))
    }

    /// Track a delivered message
    ///
    /// It supersedes every earlier delivery; only a still-pending window
    /// notice stays alongside it, so the set never grows past two.
    async fn track_sent(&self, session: &mut Session, handle: NotificationHandle) {
        let notice = self.pending_notice(session);
        let dropped = session
            .scheduled_notification_ids
            .iter()
            .filter(|h| Some(*h) != notice.as_ref())
            .count();
        if dropped > 0 {
            debug!(session_id = %session.id, dropped, "Superseded delivered notifications");
        }
        session.window_notice_id = notice.clone();
        session.scheduled_notification_ids = notice.into_iter().chain(std::iter::once(handle)).collect();
        self.sync_handles(session).await;
    }

    async fn sync_handles(&self, session: &Session) {
        self.ctx
            .notifications
            .restore(&session.id, session.scheduled_notification_ids.clone())
            .await;
    }

    async fn schedule_follow_up(&self, session: &mut Session, delay: Duration) -> Result<()> {
        let run_at = self.ctx.clock.now() + delay;
        let job_id = self
            .ctx
            .jobs
            .schedule(&session.id, JobKind::FollowUp, run_at, self.callback(JobKind::FollowUp))
            .await?;
        debug!(session_id = %session.id, %job_id, %run_at, "Follow-up scheduled");
        session.scheduled_job_id = Some(job_id);
        Ok(())
    }

    fn callback(&self, kind: JobKind) -> JobCallback {
        let ctx = Arc::downgrade(&self.ctx);
        let session_id = self.session_id.clone();
        Box::new(move || Box::pin(fire(ctx, session_id, kind)))
    }
}

/// Entry point for session jobs fired by the scheduling engine
async fn fire(ctx: Weak<HauntContext>, session_id: SessionId, kind: JobKind) {
    let Some(ctx) = ctx.upgrade() else {
        debug!(%session_id, %kind, "Job fired after shutdown, ignoring");
        return;
    };
    let haunter = Haunter::new(session_id, ctx);
    let result = match kind {
        JobKind::FollowUp => haunter.on_follow_up().await,
        JobKind::WindowOpen => haunter.window_opened().await,
        JobKind::WindowClose => haunter.window_closed().await,
        JobKind::DailyBootstrap => {
            error!(session_id = %haunter.session_id, "Daily bootstrap job registered against a session");
            return;
        }
    };
    if let Err(e) = result {
        error!(session_id = %haunter.session_id, %kind, error = %e, "Scheduled transition failed");
    }
}

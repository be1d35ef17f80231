//! Crash recovery
//!
//! Re-derives every live session's jobs from the persisted store after a
//! restart. Nothing held by the scheduling engine is trusted: the engine
//! starts empty and each non-terminal session is re-armed from its own row.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::{PersonaKind, Session, SessionStatus};
use crate::error::Result;
use crate::haunter::HauntManager;
use crate::state::SessionStore;

/// What recovery does with one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPlan {
    /// Re-schedule the window notice and open/close jobs
    Arm,
    /// Never started and no window to wait for: start now
    Start,
    /// Mid-escalation: schedule the next follow-up
    Resume,
    /// The commitment window closed while we were down
    CloseWindow,
}

impl std::fmt::Display for RecoveryPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecoveryPlan::Arm => "arm",
            RecoveryPlan::Start => "start",
            RecoveryPlan::Resume => "resume",
            RecoveryPlan::CloseWindow => "close-window",
        };
        write!(f, "{}", s)
    }
}

/// Recovery statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryStats {
    pub armed: usize,
    pub started: usize,
    pub resumed: usize,
    pub windows_closed: usize,
    /// Sessions whose recovery failed (logged, left for the operator)
    pub failed: usize,
}

impl RecoveryStats {
    pub fn total(&self) -> usize {
        self.armed + self.started + self.resumed + self.windows_closed
    }

    fn count(&mut self, plan: RecoveryPlan) {
        match plan {
            RecoveryPlan::Arm => self.armed += 1,
            RecoveryPlan::Start => self.started += 1,
            RecoveryPlan::Resume => self.resumed += 1,
            RecoveryPlan::CloseWindow => self.windows_closed += 1,
        }
    }
}

impl std::fmt::Display for RecoveryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "armed: {}, started: {}, resumed: {}, windows closed: {}, failed: {}",
            self.armed, self.started, self.resumed, self.windows_closed, self.failed
        )
    }
}

/// Decide how to recover one session, or None if it needs nothing
pub fn plan_for(session: &Session, now: DateTime<Utc>) -> Option<RecoveryPlan> {
    if session.status.is_terminal() {
        return None;
    }
    if session.persona == PersonaKind::Commitment && session.window_closed_at(now) {
        return Some(RecoveryPlan::CloseWindow);
    }
    match session.status {
        SessionStatus::NotStarted if session.window_start.is_some() => Some(RecoveryPlan::Arm),
        SessionStatus::NotStarted => Some(RecoveryPlan::Start),
        SessionStatus::InProgress | SessionStatus::Cancelled => Some(RecoveryPlan::Resume),
        SessionStatus::Complete => None,
    }
}

/// Scan the store for sessions needing recovery
pub async fn scan_for_recovery(store: &dyn SessionStore, now: DateTime<Utc>) -> Result<Vec<(Session, RecoveryPlan)>> {
    let sessions = store.list(None).await?;
    let plans: Vec<_> = sessions
        .into_iter()
        .filter_map(|session| plan_for(&session, now).map(|plan| (session, plan)))
        .collect();

    for (session, plan) in &plans {
        debug!(
            session_id = %session.id,
            persona = %session.persona,
            status = %session.status,
            attempt = session.attempt,
            %plan,
            "Found session needing recovery"
        );
    }
    if plans.is_empty() {
        debug!("Recovery scan found no live sessions");
    }
    Ok(plans)
}

/// Re-derive jobs for every live session
///
/// Per-session failures are logged and counted; only invariant violations
/// abort recovery.
pub async fn recover(manager: &HauntManager) -> Result<RecoveryStats> {
    let now = manager.now();
    debug!(%now, "recover: called");
    let mut stats = RecoveryStats::default();

    for (session, plan) in scan_for_recovery(manager.store().as_ref(), now).await? {
        // Outstanding handles first, so re-arming never duplicates a live notice
        manager
            .notifications()
            .restore(&session.id, session.scheduled_notification_ids.clone())
            .await;

        let haunter = manager.haunter(&session.id);
        let result = match plan {
            RecoveryPlan::Arm => haunter.arm().await,
            RecoveryPlan::Start => haunter.start().await,
            RecoveryPlan::Resume => haunter.resume().await,
            RecoveryPlan::CloseWindow => haunter.window_closed().await,
        };

        match result {
            Ok(_) => stats.count(plan),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(session_id = %session.id, %plan, error = %e, "Failed to recover session");
                stats.failed += 1;
            }
        }
    }

    if stats.total() > 0 || stats.failed > 0 {
        info!("Recovery complete: {}", stats);
    }
    Ok(stats)
}

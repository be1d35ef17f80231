//! JobRegistry - at most one live scheduling-engine job per (session, kind)

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::domain::{JobId, JobKind, SessionId};
use crate::scheduler::{JobCallback, SchedulerError, SchedulingEngine};

/// Errors from the job registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A second live job for the same (session, kind) was detected
    #[error("Registry invariant violated for job {job_id}: {reason}")]
    InvariantViolation { job_id: JobId, reason: String },

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// Registered job bookkeeping
#[derive(Debug, Clone)]
struct JobEntry {
    job_id: JobId,
    run_at: DateTime<Utc>,
    generation: u64,
}

type JobTable = HashMap<(SessionId, JobKind), JobEntry>;

/// Maps (session, kind) to the engine's job and enforces replace-not-append
pub struct JobRegistry {
    engine: Arc<dyn SchedulingEngine>,
    inner: Arc<Mutex<JobTable>>,
    generation: AtomicU64,
}

impl JobRegistry {
    pub fn new(engine: Arc<dyn SchedulingEngine>) -> Self {
        debug!("JobRegistry::new: called");
        Self {
            engine,
            inner: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Schedule (or reschedule) the job for `(session_id, kind)`
    ///
    /// Any existing job with the same ID is cancelled first. The registry lock
    /// is held from the existence check through registration.
    pub async fn schedule(
        &self,
        session_id: &SessionId,
        kind: JobKind,
        run_at: DateTime<Utc>,
        callback: JobCallback,
    ) -> Result<JobId, RegistryError> {
        debug!(%session_id, %kind, %run_at, "JobRegistry::schedule: called");
        let job_id = JobId::for_session(session_id, kind);
        let mut inner = self.inner.lock().await;

        if self.engine.remove_job(&job_id).await {
            debug!(%job_id, "JobRegistry::schedule: replaced existing job");
        }
        if self.engine.contains(&job_id).await {
            error!(%job_id, "Engine still holds job after removal");
            return Err(RegistryError::InvariantViolation {
                job_id,
                reason: "job survived removal".to_string(),
            });
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let table = Arc::clone(&self.inner);
        let key = (session_id.clone(), kind);
        // A job that lost a race with cancel/replace must not run
        let wrapped: JobCallback = Box::new(move || {
            Box::pin(async move {
                let current = {
                    let mut table = table.lock().await;
                    let current = table.get(&key).is_some_and(|e| e.generation == generation);
                    if current {
                        table.remove(&key);
                    }
                    current
                };
                if current {
                    callback().await;
                } else {
                    debug!(session_id = %key.0, kind = %key.1, "Superseded job fired, skipping");
                }
            })
        });

        match self.engine.add_job(job_id.clone(), run_at, wrapped).await {
            Ok(_) => {}
            Err(SchedulerError::DuplicateJob(job_id)) => {
                error!(%job_id, "Duplicate job detected while registering");
                return Err(RegistryError::InvariantViolation {
                    job_id,
                    reason: "engine reported a duplicate".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        inner.insert(
            (session_id.clone(), kind),
            JobEntry {
                job_id: job_id.clone(),
                run_at,
                generation,
            },
        );
        Ok(job_id)
    }

    /// Cancel the job for `(session_id, kind)`; returns whether one was live
    pub async fn cancel(&self, session_id: &SessionId, kind: JobKind) -> bool {
        debug!(%session_id, %kind, "JobRegistry::cancel: called");
        let job_id = JobId::for_session(session_id, kind);
        let mut inner = self.inner.lock().await;
        inner.remove(&(session_id.clone(), kind));
        self.engine.remove_job(&job_id).await
    }

    /// Cancel every kind of job for a session; returns how many were live
    pub async fn cancel_all(&self, session_id: &SessionId) -> usize {
        debug!(%session_id, "JobRegistry::cancel_all: called");
        let mut cancelled = 0;
        for kind in JobKind::ALL {
            if self.cancel(session_id, kind).await {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Registered job ID for `(session_id, kind)`, if not yet fired
    pub async fn job_id(&self, session_id: &SessionId, kind: JobKind) -> Option<JobId> {
        self.inner
            .lock()
            .await
            .get(&(session_id.clone(), kind))
            .map(|e| e.job_id.clone())
    }

    /// Pending jobs for a session, soonest first
    pub async fn pending(&self, session_id: &SessionId) -> Vec<(JobKind, DateTime<Utc>)> {
        let inner = self.inner.lock().await;
        let mut pending: Vec<_> = inner
            .iter()
            .filter(|((sid, _), _)| sid == session_id)
            .map(|((_, kind), entry)| (*kind, entry.run_at))
            .collect();
        pending.sort_by_key(|(_, at)| *at);
        pending
    }

    /// Total registered jobs across all sessions
    pub async fn live_jobs(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::mock::ManualScheduler;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::AtomicUsize;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn counting(counter: Arc<AtomicUsize>) -> JobCallback {
        Box::new(move || {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn test_schedule_twice_replaces() {
        let engine = Arc::new(ManualScheduler::new());
        let registry = JobRegistry::new(engine.clone());
        let session = SessionId::from("s-1");
        let fired = Arc::new(AtomicUsize::new(0));

        let first = registry
            .schedule(&session, JobKind::FollowUp, t0(), counting(fired.clone()))
            .await
            .unwrap();
        let second = registry
            .schedule(
                &session,
                JobKind::FollowUp,
                t0() + Duration::minutes(10),
                counting(fired.clone()),
            )
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.len().await, 1);
        assert_eq!(engine.removed().await, vec![first.clone()]);
        assert_eq!(engine.run_at(&second).await, Some(t0() + Duration::minutes(10)));
        assert_eq!(registry.live_jobs().await, 1);
    }

    #[tokio::test]
    async fn test_cancel_reports_presence() {
        let engine = Arc::new(ManualScheduler::new());
        let registry = JobRegistry::new(engine.clone());
        let session = SessionId::from("s-1");

        assert!(!registry.cancel(&session, JobKind::FollowUp).await);

        registry
            .schedule(&session, JobKind::FollowUp, t0(), counting(Arc::new(AtomicUsize::new(0))))
            .await
            .unwrap();
        assert!(registry.cancel(&session, JobKind::FollowUp).await);
        assert!(!registry.cancel(&session, JobKind::FollowUp).await);
        assert_eq!(engine.len().await, 0);
        assert_eq!(registry.live_jobs().await, 0);
    }

    #[tokio::test]
    async fn test_kinds_are_independent() {
        let engine = Arc::new(ManualScheduler::new());
        let registry = JobRegistry::new(engine.clone());
        let session = SessionId::from("s-1");
        let counter = Arc::new(AtomicUsize::new(0));

        registry
            .schedule(&session, JobKind::FollowUp, t0(), counting(counter.clone()))
            .await
            .unwrap();
        registry
            .schedule(
                &session,
                JobKind::WindowClose,
                t0() + Duration::hours(1),
                counting(counter.clone()),
            )
            .await
            .unwrap();

        assert_eq!(engine.len().await, 2);
        let pending = registry.pending(&session).await;
        assert_eq!(pending[0].0, JobKind::FollowUp);
        assert_eq!(pending[1].0, JobKind::WindowClose);

        assert_eq!(registry.cancel_all(&session).await, 2);
        assert_eq!(engine.len().await, 0);
    }

    #[tokio::test]
    async fn test_fired_job_clears_entry() {
        let engine = Arc::new(ManualScheduler::new());
        let registry = JobRegistry::new(engine.clone());
        let session = SessionId::from("s-1");
        let counter = Arc::new(AtomicUsize::new(0));

        let job_id = registry
            .schedule(&session, JobKind::FollowUp, t0(), counting(counter.clone()))
            .await
            .unwrap();
        assert!(engine.fire(&job_id).await);

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(registry.job_id(&session, JobKind::FollowUp).await.is_none());
        assert!(!registry.cancel(&session, JobKind::FollowUp).await);
    }

    #[tokio::test]
    async fn test_cancelled_job_that_still_fires_is_skipped() {
        let engine = Arc::new(ManualScheduler::new());
        let registry = JobRegistry::new(engine.clone());
        let session = SessionId::from("s-1");
        let counter = Arc::new(AtomicUsize::new(0));

        let job_id = registry
            .schedule(&session, JobKind::FollowUp, t0(), counting(counter.clone()))
            .await
            .unwrap();

        // Drop the registry entry but leave the engine job behind, as if the
        // engine had already dequeued it when cancel ran
        registry.inner.lock().await.remove(&(session.clone(), JobKind::FollowUp));
        assert!(engine.fire(&job_id).await);

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sessions_do_not_collide() {
        let engine = Arc::new(ManualScheduler::new());
        let registry = JobRegistry::new(engine.clone());
        let counter = Arc::new(AtomicUsize::new(0));

        for sid in ["s-a", "s-b", "s-c"] {
            registry
                .schedule(&SessionId::from(sid), JobKind::FollowUp, t0(), counting(counter.clone()))
                .await
                .unwrap();
        }
        assert_eq!(engine.len().await, 3);
        assert_eq!(registry.live_jobs().await, 3);
    }
}

//! Tokio-timer implementation of the scheduling engine
//!
//! Each job is a spawned task that sleeps until its due time, unregisters
//! itself, then runs the callback. Removing a job aborts its task.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::domain::JobId;

use super::engine::{Clock, JobCallback, SchedulerError, SchedulingEngine, SystemClock};

/// A job waiting to fire
struct LiveJob {
    run_at: DateTime<Utc>,
    generation: u64,
    handle: AbortHandle,
}

/// Statistics for the scheduler
#[derive(Debug, Default, Clone)]
pub struct SchedulerStats {
    pub total_added: u64,
    pub total_fired: u64,
    pub total_removed: u64,
}

/// Internal state protected by mutex
#[derive(Default)]
struct SchedulerInner {
    jobs: HashMap<JobId, LiveJob>,
    stats: SchedulerStats,
    shut_down: bool,
}

/// Scheduling engine backed by tokio timers
pub struct TokioScheduler {
    inner: Arc<Mutex<SchedulerInner>>,
    clock: Arc<dyn Clock>,
    generation: AtomicU64,
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioScheduler {
    /// Create a scheduler driven by the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a scheduler that measures delays against `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        debug!("TokioScheduler::with_clock: called");
        Self {
            inner: Arc::new(Mutex::new(SchedulerInner::default())),
            clock,
            generation: AtomicU64::new(0),
        }
    }

    /// Number of live jobs
    pub async fn len(&self) -> usize {
        self.inner.lock().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Due time of a live job
    pub async fn run_at(&self, job_id: &JobId) -> Option<DateTime<Utc>> {
        self.inner.lock().await.jobs.get(job_id).map(|j| j.run_at)
    }

    /// Get the scheduler statistics
    pub async fn stats(&self) -> SchedulerStats {
        self.inner.lock().await.stats.clone()
    }

    /// Abort every live job and refuse new ones
    pub async fn shutdown(&self) {
        debug!("TokioScheduler::shutdown: called");
        let mut inner = self.inner.lock().await;
        let count = inner.jobs.len();
        for (_, job) in inner.jobs.drain() {
            job.handle.abort();
        }
        inner.shut_down = true;
        info!(aborted = count, "Scheduler shut down");
    }
}

#[async_trait]
impl SchedulingEngine for TokioScheduler {
    async fn add_job(
        &self,
        job_id: JobId,
        run_at: DateTime<Utc>,
        callback: JobCallback,
    ) -> Result<JobId, SchedulerError> {
        debug!(%job_id, %run_at, "TokioScheduler::add_job: called");
        let mut inner = self.inner.lock().await;

        if inner.shut_down {
            return Err(SchedulerError::ShutDown);
        }
        if inner.jobs.contains_key(&job_id) {
            debug!(%job_id, "TokioScheduler::add_job: already live, rejecting");
            return Err(SchedulerError::DuplicateJob(job_id));
        }

        let delay = (run_at - self.clock.now()).to_std().unwrap_or_default();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);

        let shared = Arc::clone(&self.inner);
        let task_id = job_id.clone();
        // The spawned task blocks on the lock we hold until the entry is inserted
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut inner = shared.lock().await;
                let ours = inner.jobs.get(&task_id).is_some_and(|j| j.generation == generation);
                if !ours {
                    debug!(job_id = %task_id, "TokioScheduler: superseded job woke up, skipping");
                    return;
                }
                inner.jobs.remove(&task_id);
                inner.stats.total_fired += 1;
            }
            debug!(job_id = %task_id, "TokioScheduler: firing job");
            callback().await;
        })
        .abort_handle();

        inner.jobs.insert(
            job_id.clone(),
            LiveJob {
                run_at,
                generation,
                handle,
            },
        );
        inner.stats.total_added += 1;
        Ok(job_id)
    }

    async fn remove_job(&self, job_id: &JobId) -> bool {
        debug!(%job_id, "TokioScheduler::remove_job: called");
        let mut inner = self.inner.lock().await;
        match inner.jobs.remove(job_id) {
            Some(job) => {
                job.handle.abort();
                inner.stats.total_removed += 1;
                true
            }
            None => {
                debug!(%job_id, "TokioScheduler::remove_job: not live");
                false
            }
        }
    }

    async fn contains(&self, job_id: &JobId) -> bool {
        self.inner.lock().await.jobs.contains_key(job_id)
    }
}

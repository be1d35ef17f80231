//! SchedulingEngine trait definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use thiserror::Error;

use crate::domain::JobId;

/// Work to run when a job comes due
pub type JobCallback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Errors from the scheduling engine
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Job already exists: {0}")]
    DuplicateJob(JobId),

    #[error("Scheduler is shut down")]
    ShutDown,
}

/// Generic delayed-callback facility
///
/// One engine per process; the host constructs it and passes it by reference
/// into every component that schedules work.
#[async_trait]
pub trait SchedulingEngine: Send + Sync {
    /// Register a job; fails if a job with the same ID is already live
    async fn add_job(&self, job_id: JobId, run_at: DateTime<Utc>, callback: JobCallback)
    -> Result<JobId, SchedulerError>;

    /// Remove a live job; returns whether anything was removed
    async fn remove_job(&self, job_id: &JobId) -> bool;

    /// Whether a job with this ID is live (scheduled, not yet fired)
    async fn contains(&self, job_id: &JobId) -> bool;

    /// Replace any live job with this ID
    async fn replace_job(
        &self,
        job_id: JobId,
        run_at: DateTime<Utc>,
        callback: JobCallback,
    ) -> Result<JobId, SchedulerError> {
        self.remove_job(&job_id).await;
        self.add_job(job_id, run_at, callback).await
    }
}

/// Source of "now" for every scheduling decision
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

//! Scheduling engine
//!
//! A generic delayed-callback facility. The engine knows nothing about
//! sessions; `registry::JobRegistry` supplies its job IDs.

mod engine;
mod tokio_engine;

pub use engine::{Clock, JobCallback, SchedulerError, SchedulingEngine, SystemClock};
pub use tokio_engine::{SchedulerStats, TokioScheduler};

#[cfg(test)]
pub mod mock {
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use tokio::sync::Mutex;
    use tracing::debug;

    use super::*;
    use crate::domain::JobId;

    /// Clock that only moves when told to
    pub struct ManualClock {
        now: StdMutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                now: StdMutex::new(start),
            }
        }

        pub fn set(&self, now: DateTime<Utc>) {
            *self.now.lock().unwrap() = now;
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    /// Scheduler whose jobs only fire when the test fires them
    #[derive(Default)]
    pub struct ManualScheduler {
        jobs: Mutex<HashMap<JobId, (DateTime<Utc>, JobCallback)>>,
        removed: Mutex<Vec<JobId>>,
    }

    impl ManualScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn len(&self) -> usize {
            self.jobs.lock().await.len()
        }

        pub async fn run_at(&self, job_id: &JobId) -> Option<DateTime<Utc>> {
            self.jobs.lock().await.get(job_id).map(|(at, _)| *at)
        }

        pub async fn job_ids(&self) -> Vec<JobId> {
            let mut ids: Vec<_> = self.jobs.lock().await.keys().cloned().collect();
            ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            ids
        }

        /// IDs removed via `remove_job`, in order
        pub async fn removed(&self) -> Vec<JobId> {
            self.removed.lock().await.clone()
        }

        /// Fire a job now; returns false if it was not live
        pub async fn fire(&self, job_id: &JobId) -> bool {
            debug!(%job_id, "ManualScheduler::fire: called");
            // Release the lock before running: the callback may reschedule
            let entry = self.jobs.lock().await.remove(job_id);
            match entry {
                Some((_, callback)) => {
                    callback().await;
                    true
                }
                None => false,
            }
        }
    }

    #[async_trait]
    impl SchedulingEngine for ManualScheduler {
        async fn add_job(
            &self,
            job_id: JobId,
            run_at: DateTime<Utc>,
            callback: JobCallback,
        ) -> Result<JobId, SchedulerError> {
            let mut jobs = self.jobs.lock().await;
            if jobs.contains_key(&job_id) {
                return Err(SchedulerError::DuplicateJob(job_id));
            }
            jobs.insert(job_id.clone(), (run_at, callback));
            Ok(job_id)
        }

        async fn remove_job(&self, job_id: &JobId) -> bool {
            let removed = self.jobs.lock().await.remove(job_id).is_some();
            if removed {
                self.removed.lock().await.push(job_id.clone());
            }
            removed
        }

        async fn contains(&self, job_id: &JobId) -> bool {
            self.jobs.lock().await.contains_key(job_id)
        }
    }
}

//! NotificationCorrelator - which notification handles belong to which session
//!
//! Pure bookkeeping: the transport is only touched through the cancellation
//! function handed to `cancel_all`.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::{NotificationHandle, SessionId};

/// Outcome of a `cancel_all` sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CancelReport {
    pub cancelled: usize,
    pub failed: usize,
}

/// Tracks outstanding notification handles per session
#[derive(Default)]
pub struct NotificationCorrelator {
    inner: Mutex<HashMap<SessionId, Vec<NotificationHandle>>>,
}

impl NotificationCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a handle issued for a session
    pub async fn record(&self, session_id: &SessionId, handle: NotificationHandle) {
        debug!(%session_id, %handle, "NotificationCorrelator::record: called");
        let mut inner = self.inner.lock().await;
        let handles = inner.entry(session_id.clone()).or_default();
        if !handles.contains(&handle) {
            handles.push(handle);
        }
    }

    /// Outstanding handles for a session, oldest first
    pub async fn outstanding(&self, session_id: &SessionId) -> Vec<NotificationHandle> {
        self.inner.lock().await.get(session_id).cloned().unwrap_or_default()
    }

    pub async fn has_outstanding(&self, session_id: &SessionId) -> bool {
        self.inner.lock().await.get(session_id).is_some_and(|h| !h.is_empty())
    }

    /// Replace the tracked set (superseded handles, crash recovery)
    pub async fn restore(&self, session_id: &SessionId, handles: Vec<NotificationHandle>) {
        debug!(%session_id, count = handles.len(), "NotificationCorrelator::restore: called");
        let mut inner = self.inner.lock().await;
        if handles.is_empty() {
            inner.remove(session_id);
        } else {
            inner.insert(session_id.clone(), handles);
        }
    }

    /// Drop a session's handles without cancelling them
    pub async fn forget(&self, session_id: &SessionId) {
        self.inner.lock().await.remove(session_id);
    }

    /// Cancel every recorded handle for a session, then clear the set
    ///
    /// Individual failures are logged and skipped; the set is cleared either
    /// way, since a handle the transport refuses to cancel has already fired
    /// or been deleted.
    pub async fn cancel_all<F, Fut, E>(&self, session_id: &SessionId, cancel_fn: F) -> CancelReport
    where
        F: Fn(NotificationHandle) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        debug!(%session_id, "NotificationCorrelator::cancel_all: called");
        // Take the set out first so no handle is cancelled twice
        let handles = self.inner.lock().await.remove(session_id).unwrap_or_default();

        let mut report = CancelReport::default();
        for handle in handles {
            match cancel_fn(handle.clone()).await {
                Ok(()) => report.cancelled += 1,
                Err(e) => {
                    warn!(%session_id, %handle, error = %e, "Failed to cancel notification, continuing");
                    report.failed += 1;
                }
            }
        }

        debug!(%session_id, ?report, "NotificationCorrelator::cancel_all: done");
        report
    }
}

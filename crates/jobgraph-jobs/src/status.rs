//! Live job status tracking and run control.

use crate::job::{JobId, JobState};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Point-in-time status of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Job ID.
    pub id: JobId,
    /// Current state.
    pub state: JobState,
    /// Attempts started so far.
    pub attempts: u32,
}

#[derive(Debug, Default)]
struct TrackerInner {
    order: Vec<JobId>,
    jobs: HashMap<JobId, JobStatus>,
}

/// Shared, read-mostly view of job states.
///
/// The scheduler's coordinator is the only writer; handles read snapshots
/// while a run is in progress.
#[derive(Debug, Clone, Default)]
pub struct StatusTracker {
    inner: Arc<RwLock<TrackerInner>>,
}

impl StatusTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the jobs of a run, all `Pending`, replacing any previous run.
    pub fn reset<'a>(&self, ids: impl IntoIterator<Item = &'a JobId>) {
        let mut inner = self.inner.write();
        inner.order.clear();
        inner.jobs.clear();
        for id in ids {
            inner.order.push(id.clone());
            inner.jobs.insert(
                id.clone(),
                JobStatus {
                    id: id.clone(),
                    state: JobState::Pending,
                    attempts: 0,
                },
            );
        }
    }

    /// Record a state change.
    pub fn update(&self, id: &JobId, state: JobState, attempts: u32) {
        if let Some(status) = self.inner.write().jobs.get_mut(id) {
            status.state = state;
            status.attempts = attempts;
        }
    }

    /// State of a single job.
    pub fn state_of(&self, id: &JobId) -> Option<JobState> {
        self.inner.read().jobs.get(id).map(|s| s.state)
    }

    /// All jobs in submission order.
    pub fn snapshot(&self) -> Vec<JobStatus> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect()
    }

    /// Job counts per state.
    pub fn summary(&self) -> StatusSummary {
        let inner = self.inner.read();
        StatusSummary::from_states(inner.jobs.values().map(|s| s.state))
    }
}

/// Job counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: usize,
    pub pending: usize,
    pub ready: usize,
    pub running: usize,
    pub retry_pending: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub blocked: usize,
    pub cancelled: usize,
}

impl StatusSummary {
    /// Count states.
    pub fn from_states(states: impl IntoIterator<Item = JobState>) -> Self {
        let mut summary = Self::default();
        for state in states {
            summary.total += 1;
            match state {
                JobState::Pending => summary.pending += 1,
                JobState::Ready => summary.ready += 1,
                JobState::Running => summary.running += 1,
                JobState::RetryPending => summary.retry_pending += 1,
                JobState::Succeeded => summary.succeeded += 1,
                JobState::Failed => summary.failed += 1,
                JobState::Blocked => summary.blocked += 1,
                JobState::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    /// Jobs that reached a terminal state.
    pub fn finished(&self) -> usize {
        self.succeeded + self.failed + self.blocked + self.cancelled
    }

    /// Returns true when every job reached a terminal state.
    pub fn is_complete(&self) -> bool {
        self.finished() == self.total
    }
}

/// Cloneable control handle for a scheduler.
///
/// Obtained from [`Scheduler::handle`](crate::Scheduler::handle) before
/// `run()` consumes the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    cancel_tx: Arc<watch::Sender<bool>>,
    tracker: StatusTracker,
}

impl SchedulerHandle {
    pub(crate) fn new(cancel_tx: Arc<watch::Sender<bool>>, tracker: StatusTracker) -> Self {
        Self { cancel_tx, tracker }
    }

    /// Request cancellation: nothing new is dispatched, in-flight jobs finish.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// All jobs in submission order.
    pub fn snapshot(&self) -> Vec<JobStatus> {
        self.tracker.snapshot()
    }

    /// State of a single job.
    pub fn state_of(&self, id: &JobId) -> Option<JobState> {
        self.tracker.state_of(id)
    }

    /// Job counts per state.
    pub fn summary(&self) -> StatusSummary {
        self.tracker.summary()
    }
}

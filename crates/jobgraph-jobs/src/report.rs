//! Run reports.

use crate::job::{JobId, JobState};
use crate::status::StatusSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every job succeeded.
    Success,
    /// At least one job failed or was blocked.
    PartialSuccess,
    /// Cancellation was observed and left jobs unrun.
    Cancelled,
}

impl RunStatus {
    /// Metric label / display form.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::PartialSuccess => "partial_success",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final record of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    /// Terminal state.
    pub state: JobState,

    /// Attempts started.
    pub attempts: u32,

    /// Time spent ready or waiting out backoff before dispatch.
    #[serde(rename = "total_wait_ms", with = "duration_ms")]
    pub total_wait_time: Duration,

    /// Error of the last failed attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Failed job that blocked this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<JobId>,
}

/// Result of [`Scheduler::run`](crate::Scheduler::run).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub jobs: BTreeMap<JobId, JobReport>,
    /// One entry per dispatched attempt, in dispatch order.
    pub dispatch_order: Vec<JobId>,
}

impl RunReport {
    /// Report for one job.
    pub fn job(&self, id: &JobId) -> Option<&JobReport> {
        self.jobs.get(id)
    }

    /// Terminal state of one job.
    pub fn state_of(&self, id: &JobId) -> Option<JobState> {
        self.jobs.get(id).map(|job| job.state)
    }

    /// Jobs that ended in `state`, in id order.
    pub fn jobs_in(&self, state: JobState) -> Vec<&JobId> {
        self.jobs
            .iter()
            .filter(|(_, job)| job.state == state)
            .map(|(id, _)| id)
            .collect()
    }

    /// Position of the first dispatch of `id`.
    pub fn first_dispatch(&self, id: &JobId) -> Option<usize> {
        self.dispatch_order.iter().position(|d| d == id)
    }

    /// Returns true if every job succeeded.
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Wall-clock duration of the run.
    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Job counts per terminal state.
    pub fn summary(&self) -> StatusSummary {
        StatusSummary::from_states(self.jobs.values().map(|job| job.state))
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

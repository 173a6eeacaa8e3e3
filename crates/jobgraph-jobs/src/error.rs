//! Scheduler and job error types.

use crate::job::JobId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors that abort a batch before any job runs.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A job references a dependency that was never submitted.
    #[error("Job {job} depends on unknown job {dependency}")]
    UnknownDependency { job: JobId, dependency: JobId },

    /// The dependency graph contains a cycle.
    #[error("Dependency cycle among jobs: {}", format_ids(.jobs))]
    Cycle { jobs: Vec<JobId> },

    /// Two jobs were submitted with the same identifier.
    #[error("Duplicate job id: {0}")]
    DuplicateJob(JobId),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// Returns the jobs named by a cycle error.
    pub fn cycle_members(&self) -> Option<&[JobId]> {
        match self {
            SchedulerError::Cycle { jobs } => Some(jobs),
            _ => None,
        }
    }
}

impl From<jobgraph_core::JobgraphError> for SchedulerError {
    fn from(err: jobgraph_core::JobgraphError) -> Self {
        match err {
            jobgraph_core::JobgraphError::Configuration(msg) => SchedulerError::Configuration(msg),
            other => SchedulerError::Internal(other.to_string()),
        }
    }
}

fn format_ids(ids: &[JobId]) -> String {
    ids.iter()
        .map(JobId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Retryable (timeouts, refused connections, ...).
    Transient,
    /// Immediately terminal for the job and its dependents.
    Permanent,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// Failure returned by a job action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} failure: {message}")]
pub struct JobFailure {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Human readable cause.
    pub message: String,
}

impl JobFailure {
    /// Creates a retryable failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Creates a terminal failure.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// Returns true if the failure may be retried.
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

/// Result of one execution attempt.
pub type Outcome = Result<(), JobFailure>;

//! Job definitions.

use crate::error::Outcome;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Creates a job ID from a string.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job priority. Lower values are more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    /// Time-sensitive work.
    pub const CRITICAL: Priority = Priority(-20);
    /// Important work.
    pub const HIGH: Priority = Priority(-10);
    /// Default priority.
    pub const NORMAL: Priority = Priority(0);
    /// Background work.
    pub const LOW: Priority = Priority(10);

    /// Returns the raw value.
    pub fn value(self) -> i32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NORMAL
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Priority(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job execution context.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job ID.
    pub job_id: JobId,

    /// Run this attempt belongs to.
    pub run_id: Uuid,

    /// Current attempt number (1-based).
    pub attempt: u32,

    /// Maximum attempts allowed.
    pub max_attempts: u32,

    /// Attempt started executing at this time.
    pub started_at: DateTime<Utc>,
}

impl JobContext {
    /// Returns true if this is the last attempt.
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Returns remaining attempts after this one.
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt)
    }
}

/// Capability to execute a job's external effect.
///
/// # Example
///
/// ```rust,ignore
/// use jobgraph_jobs::{Executable, JobContext, JobFailure, Outcome};
///
/// struct HealthCheck {
///     url: String,
/// }
///
/// #[async_trait::async_trait]
/// impl Executable for HealthCheck {
///     async fn run(&self, ctx: JobContext) -> Outcome {
///         probe(&self.url)
///             .await
///             .map_err(|e| JobFailure::transient(e.to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait Executable: Send + Sync + 'static {
    /// Execute one attempt.
    async fn run(&self, ctx: JobContext) -> Outcome;
}

/// Boxed closure form of an action.
pub type JobHandler = Box<dyn Fn(JobContext) -> BoxFuture<'static, Outcome> + Send + Sync>;

/// Adapts an async closure into an [`Executable`].
pub struct FnAction {
    handler: JobHandler,
}

impl FnAction {
    /// Wrap a closure returning a future.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        Self {
            handler: Box::new(move |ctx| f(ctx).boxed()),
        }
    }
}

impl fmt::Debug for FnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction").finish_non_exhaustive()
    }
}

#[async_trait]
impl Executable for FnAction {
    async fn run(&self, ctx: JobContext) -> Outcome {
        (self.handler)(ctx).await
    }
}

/// A job as submitted to the scheduler.
#[derive(Clone)]
pub struct JobSpec {
    /// Job ID.
    pub id: JobId,

    /// Priority (lower = more urgent). Unset jobs take the scheduler default.
    pub priority: Option<Priority>,

    /// Jobs that must succeed first.
    pub dependencies: Vec<JobId>,

    /// Action executed for each attempt.
    pub action: Arc<dyn Executable>,

    /// Overrides the scheduler's retry policy.
    pub retry_policy: Option<RetryPolicy>,

    /// Overrides the scheduler's per-attempt timeout.
    pub timeout: Option<Duration>,
}

impl fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSpec")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("dependencies", &self.dependencies)
            .field("retry_policy", &self.retry_policy)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl JobSpec {
    /// Create a job with default priority and no dependencies.
    pub fn new(id: impl Into<JobId>, action: impl Executable) -> Self {
        Self::with_action(id, Arc::new(action))
    }

    /// Create a job from a shared action.
    pub fn with_action(id: impl Into<JobId>, action: Arc<dyn Executable>) -> Self {
        Self {
            id: id.into(),
            priority: None,
            dependencies: Vec::new(),
            action,
            retry_policy: None,
            timeout: None,
        }
    }

    /// Create a job from an async closure.
    pub fn from_fn<F, Fut>(id: impl Into<JobId>, f: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        Self::new(id, FnAction::new(f))
    }

    /// Set the priority.
    pub fn priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    /// Add a dependency.
    pub fn depends_on(mut self, id: impl Into<JobId>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// Add multiple dependencies.
    pub fn depends_on_all(mut self, ids: impl IntoIterator<Item = impl Into<JobId>>) -> Self {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Override the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Job state within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting on dependencies.
    #[default]
    Pending,
    /// Eligible for dispatch.
    Ready,
    /// Executing on a worker.
    Running,
    /// Waiting out a backoff delay before becoming ready again.
    RetryPending,
    /// Completed successfully.
    Succeeded,
    /// Failed permanently or ran out of attempts.
    Failed,
    /// Never run because a dependency failed.
    Blocked,
    /// Never run because the run was cancelled.
    Cancelled,
}

impl JobState {
    /// Returns true once the job can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Blocked | JobState::Cancelled
        )
    }

    /// Returns true for both direct and blocked failures.
    pub fn is_failure(self) -> bool {
        matches!(self, JobState::Failed | JobState::Blocked)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Ready => write!(f, "ready"),
            JobState::Running => write!(f, "running"),
            JobState::RetryPending => write!(f, "retry_pending"),
            JobState::Succeeded => write!(f, "succeeded"),
            JobState::Failed => write!(f, "failed"),
            JobState::Blocked => write!(f, "failed(blocked)"),
            JobState::Cancelled => write!(f, "cancelled"),
        }
    }
}

//! Jobgraph Jobs - Dependency-Ordered Job Scheduler
//!
//! Runs a batch of jobs on a bounded worker pool:
//! - Dependency graph validated up front (unknown ids, duplicates, cycles)
//! - Ready jobs dispatched in (priority, submission) order
//! - Transient failures retried with capped exponential backoff
//! - Permanent failures block every transitive dependent
//! - Per-attempt timeouts and cooperative cancellation
//! - A serializable run report
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Jobgraph Scheduler                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  submit(JobSpec) ──► GraphResolver ──► ReadyGraph             │
//! │                                            │                  │
//! │                                            ▼ seeds            │
//! │  ┌────────────────────── coordinator ────────────────────┐    │
//! │  │                                                       │    │
//! │  │   ReadyQueue ◄──── retry timers ◄──── RetryPending    │    │
//! │  │   (priority, seq)                          ▲          │    │
//! │  │        │                                   │          │    │
//! │  │        ▼ pop while a slot is free          │          │    │
//! │  │   ┌──────────────── WorkerPool ─────────────────┐     │    │
//! │  │   │  Worker 1 │ Worker 2 │ ... │ Worker N       │     │    │
//! │  │   └─────────────────────┬───────────────────────┘     │    │
//! │  │                         ▼ Completion                  │    │
//! │  │   Succeeded ──► release dependents                    │    │
//! │  │   Failed    ──► block dependents                      │    │
//! │  └───────────────────────────────────────────────────────┘    │
//! │                            │                                  │
//! │                            ▼                                  │
//! │                        RunReport                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use jobgraph_jobs::prelude::*;
//!
//! let mut scheduler = Scheduler::new(JobsConfig::default());
//! scheduler.submit_all([
//!     JobSpec::from_fn("fetch", |_ctx| async { Ok(()) }),
//!     JobSpec::from_fn("build", |ctx| async move {
//!         if ctx.attempt < 2 {
//!             Err(JobFailure::transient("registry unavailable"))
//!         } else {
//!             Ok(())
//!         }
//!     })
//!     .depends_on("fetch"),
//! ])?;
//!
//! let report = scheduler.run().await?;
//! assert_eq!(report.status, RunStatus::Success);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod status;
pub mod worker;

pub use config::{JobsConfig, RetryConfig, SchedulerConfig};
pub use error::{ErrorKind, JobFailure, Outcome, SchedulerError, SchedulerResult};
pub use graph::{GraphResolver, ReadyGraph};
pub use job::{Executable, FnAction, JobContext, JobHandler, JobId, JobSpec, JobState, Priority};
pub use metrics::{register_metrics, JobMetrics, SchedulerMetrics};
pub use queue::ReadyQueue;
pub use report::{JobReport, RunReport, RunStatus};
pub use retry::{RetryPolicy, RetryStrategy};
pub use scheduler::Scheduler;
pub use status::{JobStatus, SchedulerHandle, StatusSummary, StatusTracker};
pub use worker::{Completion, WorkerPool};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::job::{Executable, JobContext, JobId, JobSpec, JobState, Priority};
    pub use crate::report::{RunReport, RunStatus};
    pub use crate::retry::RetryPolicy;
    pub use crate::scheduler::Scheduler;
    pub use crate::{JobFailure, JobsConfig, Outcome, SchedulerError, SchedulerResult};
}

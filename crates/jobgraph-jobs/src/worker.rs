//! Bounded worker pool.
//!
//! Executes job attempts concurrently, at most `concurrency` at a time. The
//! pool never decides what runs next; it only reports [`Completion`]s back
//! to the scheduler's coordinator.

use crate::error::{JobFailure, Outcome, SchedulerError, SchedulerResult};
use crate::job::{Executable, JobContext, JobId};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info_span, warn, Instrument};

/// Result of one finished attempt.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Job ID.
    pub id: JobId,
    /// Attempt number (1-based).
    pub attempt: u32,
    /// What the action returned.
    pub outcome: Outcome,
    /// Time spent executing.
    pub elapsed: Duration,
    /// The attempt hit its timeout.
    pub timed_out: bool,
}

/// Worker pool backed by a semaphore and a `JoinSet`.
pub struct WorkerPool {
    concurrency: usize,
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<Completion>,
}

impl WorkerPool {
    /// Create a pool with `concurrency` worker slots.
    pub fn new(concurrency: usize) -> SchedulerResult<Self> {
        if concurrency == 0 {
            return Err(SchedulerError::Configuration(
                "max_concurrency must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            concurrency,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            tasks: JoinSet::new(),
        })
    }

    /// Configured number of slots.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Claim a free slot without waiting.
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().ok()
    }

    /// Attempts currently executing.
    pub fn active(&self) -> usize {
        self.concurrency - self.semaphore.available_permits()
    }

    /// Attempts spawned whose completion was not yet collected.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no completion is outstanding.
    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run one attempt on the slot held by `permit`.
    ///
    /// A timeout becomes a transient failure and a panic a permanent one.
    pub fn spawn(
        &mut self,
        permit: OwnedSemaphorePermit,
        action: Arc<dyn Executable>,
        ctx: JobContext,
        limit: Option<Duration>,
    ) {
        let id = ctx.job_id.clone();
        let attempt = ctx.attempt;
        let span = info_span!("job", job_id = %id, attempt);

        self.tasks.spawn(
            async move {
                let started = Instant::now();
                debug!("Executing job");

                let run = AssertUnwindSafe(action.run(ctx)).catch_unwind();
                let (outcome, timed_out) = match limit {
                    Some(limit) => match timeout(limit, run).await {
                        Ok(result) => (flatten_panic(result), false),
                        Err(_) => {
                            warn!(timeout_ms = limit.as_millis() as u64, "Job timed out");
                            (
                                Err(JobFailure::transient(format!(
                                    "timed out after {}ms",
                                    limit.as_millis()
                                ))),
                                true,
                            )
                        }
                    },
                    None => (flatten_panic(run.await), false),
                };

                drop(permit);

                Completion {
                    id,
                    attempt,
                    outcome,
                    elapsed: started.elapsed(),
                    timed_out,
                }
            }
            .instrument(span),
        );
    }

    /// Wait for the next finished attempt.
    ///
    /// Returns `None` when nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<SchedulerResult<Completion>> {
        let joined = self.tasks.join_next().await?;
        Some(joined.map_err(|e| {
            error!(error = %e, "Worker task aborted");
            SchedulerError::Internal(format!("worker task aborted: {e}"))
        }))
    }
}

fn flatten_panic(result: std::thread::Result<Outcome>) -> Outcome {
    result.unwrap_or_else(|panic| {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!(panic = %message, "Job panicked");
        Err(JobFailure::permanent(format!("panicked: {message}")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::job::FnAction;
    use chrono::Utc;
    use uuid::Uuid;

    fn ctx(id: &str) -> JobContext {
        JobContext {
            job_id: JobId::from(id),
            run_id: Uuid::new_v4(),
            attempt: 1,
            max_attempts: 1,
            started_at: Utc::now(),
        }
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(matches!(
            WorkerPool::new(0),
            Err(SchedulerError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_slots_are_bounded() {
        let pool = WorkerPool::new(2).unwrap();
        let first = pool.try_acquire();
        let second = pool.try_acquire();
        assert!(first.is_some() && second.is_some());
        assert!(pool.try_acquire().is_none());
        assert_eq!(pool.active(), 2);

        drop(first);
        assert_eq!(pool.active(), 1);
        assert!(pool.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_completion_reports_outcome() {
        let mut pool = WorkerPool::new(1).unwrap();
        let permit = pool.try_acquire().unwrap();
        let action = Arc::new(FnAction::new(|_ctx| async {
            Err(JobFailure::permanent("bad input"))
        }));

        pool.spawn(permit, action, ctx("lint"), None);
        assert_eq!(pool.in_flight(), 1);

        let done = pool.next_completion().await.unwrap().unwrap();
        assert_eq!(done.id.as_str(), "lint");
        assert_eq!(done.attempt, 1);
        assert_eq!(done.outcome.unwrap_err().kind, ErrorKind::Permanent);
        assert!(pool.is_idle());
        assert!(pool.next_completion().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_transient() {
        let mut pool = WorkerPool::new(1).unwrap();
        let permit = pool.try_acquire().unwrap();
        let action = Arc::new(FnAction::new(|_ctx| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }));

        pool.spawn(permit, action, ctx("slow"), Some(Duration::from_millis(50)));
        let done = pool.next_completion().await.unwrap().unwrap();

        assert!(done.timed_out);
        assert_eq!(done.outcome.unwrap_err().kind, ErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_panic_is_permanent() {
        let mut pool = WorkerPool::new(1).unwrap();
        let permit = pool.try_acquire().unwrap();
        let action = Arc::new(FnAction::new(|ctx: JobContext| async move {
            if ctx.attempt > 0 {
                panic!("worker exploded");
            }
            Ok(())
        }));

        pool.spawn(permit, action, ctx("boom"), None);
        let done = pool.next_completion().await.unwrap().unwrap();
        let failure = done.outcome.unwrap_err();

        assert_eq!(failure.kind, ErrorKind::Permanent);
        assert!(failure.message.contains("worker exploded"));
        assert_eq!(pool.active(), 0);
    }
}

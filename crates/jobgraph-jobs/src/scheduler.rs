//! Dependency-aware job scheduler.
//!
//! A run is driven by a single coordinator task that owns every piece of
//! bookkeeping: the ready queue, remaining in-degrees, job states and
//! retry timers. Only job actions execute concurrently, on a bounded
//! [`WorkerPool`]. The coordinator waits on three event sources:
//!
//! - worker completions
//! - the earliest retry deadline
//! - cancellation through a [`SchedulerHandle`]
//!
//! It never sleeps on a backoff delay, so retries waiting out their delay
//! do not hold back other ready jobs.

use crate::config::JobsConfig;
use crate::error::{ErrorKind, JobFailure, SchedulerError, SchedulerResult};
use crate::graph::{GraphResolver, ReadyGraph};
use crate::job::{JobContext, JobId, JobSpec, JobState, Priority};
use crate::metrics::{JobMetrics, SchedulerMetrics};
use crate::queue::ReadyQueue;
use crate::report::{JobReport, RunReport, RunStatus};
use crate::retry::RetryPolicy;
use crate::status::{SchedulerHandle, StatusSummary, StatusTracker};
use crate::worker::{Completion, WorkerPool};
use chrono::Utc;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Runs a batch of jobs in dependency order.
///
/// # Example
///
/// ```rust,ignore
/// use jobgraph_jobs::{JobSpec, JobsConfig, Priority, Scheduler};
///
/// let mut scheduler = Scheduler::new(JobsConfig::default());
/// scheduler.submit(JobSpec::from_fn("build", |_ctx| async { Ok(()) }))?;
/// scheduler.submit(
///     JobSpec::from_fn("deploy", |_ctx| async { Ok(()) })
///         .priority(Priority::HIGH)
///         .depends_on("build"),
/// )?;
///
/// let report = scheduler.run().await?;
/// println!("{}", report.to_json()?);
/// ```
pub struct Scheduler {
    config: JobsConfig,
    jobs: Vec<JobSpec>,
    ids: HashSet<JobId>,
    cancel_tx: Arc<watch::Sender<bool>>,
    tracker: StatusTracker,
}

impl Scheduler {
    /// Create a scheduler with no jobs.
    pub fn new(config: JobsConfig) -> Self {
        let (cancel_tx, _) = watch::channel(false);

        Self {
            config,
            jobs: Vec::new(),
            ids: HashSet::new(),
            cancel_tx: Arc::new(cancel_tx),
            tracker: StatusTracker::new(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &JobsConfig {
        &self.config
    }

    /// Submitted jobs, in submission order.
    pub fn jobs(&self) -> &[JobSpec] {
        &self.jobs
    }

    /// Number of submitted jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if no job was submitted.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Submit a job.
    ///
    /// Dependencies may name jobs submitted later; they are checked when the
    /// run starts.
    pub fn submit(&mut self, job: JobSpec) -> SchedulerResult<()> {
        if !self.ids.insert(job.id.clone()) {
            return Err(SchedulerError::DuplicateJob(job.id));
        }

        debug!(
            job_id = %job.id,
            dependencies = job.dependencies.len(),
            "Submitted job"
        );
        self.jobs.push(job);
        Ok(())
    }

    /// Submit several jobs, stopping at the first error.
    pub fn submit_all(&mut self, jobs: impl IntoIterator<Item = JobSpec>) -> SchedulerResult<()> {
        for job in jobs {
            self.submit(job)?;
        }
        Ok(())
    }

    /// Control handle for cancelling and observing the run.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(self.cancel_tx.clone(), self.tracker.clone())
    }

    /// Resolve the dependency graph without running anything.
    pub fn validate(&self) -> SchedulerResult<ReadyGraph> {
        GraphResolver::build(&self.jobs)
    }

    /// Run every submitted job to a terminal state.
    ///
    /// Graph errors abort before any job runs. Job failures never fail the
    /// run; they are recorded in the report.
    pub async fn run(self) -> SchedulerResult<RunReport> {
        let graph = self.validate()?;
        let pool = WorkerPool::new(self.config.scheduler.max_concurrency)?;

        let run_id = Uuid::new_v4();
        let span = info_span!("scheduler_run", run_id = %run_id);

        Run::new(run_id, self, graph).execute(pool).instrument(span).await
    }
}

struct JobEntry {
    spec: JobSpec,
    priority: Priority,
    seq: u64,
    state: JobState,
    attempts: u32,
    remaining: usize,
    policy: RetryPolicy,
    timeout: Option<Duration>,
    last_error: Option<JobFailure>,
    blocked_by: Option<JobId>,
    waiting_since: Option<Instant>,
    total_wait: Duration,
}

/// Coordinator state for one run.
struct Run {
    run_id: Uuid,
    graph: ReadyGraph,
    entries: HashMap<JobId, JobEntry>,
    queue: ReadyQueue,
    retries: BinaryHeap<Reverse<(Instant, u64, JobId)>>,
    blocked_visited: HashSet<JobId>,
    dispatch_order: Vec<JobId>,
    tracker: StatusTracker,
    cancel_rx: watch::Receiver<bool>,
    // Held so the cancel channel stays open for the whole run.
    _cancel_tx: Arc<watch::Sender<bool>>,
    cancelled: bool,
}

impl Run {
    fn new(run_id: Uuid, scheduler: Scheduler, graph: ReadyGraph) -> Self {
        let Scheduler {
            config,
            jobs,
            cancel_tx,
            tracker,
            ..
        } = scheduler;

        let default_policy = RetryPolicy::from(&config.retry);
        let default_timeout = config.scheduler.job_timeout();
        let default_priority = config.scheduler.default_priority();

        tracker.reset(graph.jobs());

        let entries = jobs
            .into_iter()
            .enumerate()
            .map(|(seq, spec)| {
                let entry = JobEntry {
                    priority: spec.priority.unwrap_or(default_priority),
                    seq: seq as u64,
                    state: JobState::Pending,
                    attempts: 0,
                    remaining: graph.in_degree(&spec.id).unwrap_or(0),
                    policy: spec
                        .retry_policy
                        .clone()
                        .unwrap_or_else(|| default_policy.clone()),
                    timeout: spec.timeout.or(default_timeout),
                    last_error: None,
                    blocked_by: None,
                    waiting_since: None,
                    total_wait: Duration::ZERO,
                    spec,
                };
                (entry.spec.id.clone(), entry)
            })
            .collect::<HashMap<_, _>>();

        Self {
            run_id,
            queue: ReadyQueue::with_capacity(entries.len()),
            entries,
            graph,
            retries: BinaryHeap::new(),
            blocked_visited: HashSet::new(),
            dispatch_order: Vec::new(),
            tracker,
            cancel_rx: cancel_tx.subscribe(),
            _cancel_tx: cancel_tx,
            cancelled: false,
        }
    }

    async fn execute(mut self, mut pool: WorkerPool) -> SchedulerResult<RunReport> {
        let started_at = Utc::now();
        info!(
            jobs = self.entries.len(),
            max_concurrency = pool.concurrency(),
            "Starting run"
        );

        let now = Instant::now();
        for id in self.graph.seeds().to_vec() {
            self.make_ready(&id, now);
        }

        if *self.cancel_rx.borrow_and_update() {
            self.cancel();
        }

        loop {
            if !self.cancelled {
                self.dispatch(&mut pool);
            }

            let drained = self.queue.is_empty() && self.retries.is_empty();
            if pool.is_idle() && (self.cancelled || drained) {
                break;
            }

            let next_retry = self.retries.peek().map(|Reverse((at, _, _))| *at);

            tokio::select! {
                changed = self.cancel_rx.changed(), if !self.cancelled => {
                    if changed.is_err() || *self.cancel_rx.borrow() {
                        self.cancel();
                    }
                }
                Some(joined) = pool.next_completion() => {
                    self.complete(joined?);
                }
                () = sleep_until(next_retry.unwrap_or_else(Instant::now)),
                    if next_retry.is_some() && !self.cancelled =>
                {
                    self.release_retries(Instant::now());
                }
                else => break,
            }
        }

        SchedulerMetrics::update_gauges(0, 0);
        self.finish(started_at)
    }

    fn make_ready(&mut self, id: &JobId, now: Instant) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.state = JobState::Ready;
            entry.waiting_since.get_or_insert(now);
            self.queue.push(id.clone(), entry.priority, entry.seq);
            self.tracker.update(id, JobState::Ready, entry.attempts);
        }
    }

    /// Pop ready jobs while worker slots are free.
    fn dispatch(&mut self, pool: &mut WorkerPool) {
        while !self.queue.is_empty() {
            let Some(permit) = pool.try_acquire() else {
                break;
            };
            let Some(id) = self.queue.pop() else {
                break;
            };
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };

            let now = Instant::now();
            let waited = entry
                .waiting_since
                .take()
                .map(|since| now.saturating_duration_since(since))
                .unwrap_or_default();
            entry.total_wait += waited;
            entry.attempts += 1;
            entry.state = JobState::Running;

            self.tracker.update(&id, JobState::Running, entry.attempts);
            self.dispatch_order.push(id.clone());
            JobMetrics::job_dispatched(id.as_str(), entry.attempts, waited);

            debug!(
                job_id = %id,
                attempt = entry.attempts,
                priority = %entry.priority,
                waited_ms = waited.as_millis() as u64,
                "Dispatching job"
            );

            let ctx = JobContext {
                job_id: id,
                run_id: self.run_id,
                attempt: entry.attempts,
                max_attempts: entry.policy.max_attempts,
                started_at: Utc::now(),
            };
            pool.spawn(permit, entry.spec.action.clone(), ctx, entry.timeout);
        }

        SchedulerMetrics::update_gauges(self.queue.len(), pool.active());
    }

    fn complete(&mut self, completion: Completion) {
        let Completion {
            id,
            attempt,
            outcome,
            elapsed,
            timed_out,
        } = completion;

        if timed_out {
            JobMetrics::job_timed_out(id.as_str());
        }

        match outcome {
            Ok(()) => self.succeed(&id, elapsed),
            Err(failure) => self.fail(&id, attempt, failure, elapsed),
        }
    }

    fn succeed(&mut self, id: &JobId, elapsed: Duration) {
        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };
        entry.state = JobState::Succeeded;
        self.tracker.update(id, JobState::Succeeded, entry.attempts);
        JobMetrics::job_succeeded(id.as_str(), elapsed);

        info!(
            job_id = %id,
            attempts = entry.attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            "Job succeeded"
        );

        let now = Instant::now();
        for dependent in self.graph.dependents(id).to_vec() {
            let released = match self.entries.get_mut(&dependent) {
                Some(next) => {
                    next.remaining = next.remaining.saturating_sub(1);
                    next.remaining == 0 && next.state == JobState::Pending
                }
                None => false,
            };
            if released {
                debug!(job_id = %dependent, "Dependencies satisfied");
                self.make_ready(&dependent, now);
            }
        }
    }

    fn fail(&mut self, id: &JobId, attempt: u32, failure: JobFailure, elapsed: Duration) {
        let cancelled = self.cancelled;
        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };
        entry.last_error = Some(failure.clone());

        if cancelled && failure.kind == ErrorKind::Transient {
            entry.state = JobState::Cancelled;
            self.tracker.update(id, JobState::Cancelled, entry.attempts);
            JobMetrics::jobs_cancelled(1);
            info!(job_id = %id, attempt, error = %failure, "Job cancelled after transient failure");
            return;
        }

        if !cancelled && entry.policy.should_retry(attempt, failure.kind) {
            let delay = entry.policy.backoff_delay(attempt);
            let now = Instant::now();
            entry.state = JobState::RetryPending;
            entry.waiting_since = Some(now);
            self.tracker.update(id, JobState::RetryPending, entry.attempts);
            self.retries.push(Reverse((now + delay, entry.seq, id.clone())));
            JobMetrics::job_retried(id.as_str(), attempt);

            warn!(
                job_id = %id,
                attempt,
                max_attempts = entry.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Job failed, retry scheduled"
            );
            return;
        }

        entry.state = JobState::Failed;
        self.tracker.update(id, JobState::Failed, entry.attempts);
        JobMetrics::job_failed(id.as_str(), &failure.kind.to_string(), elapsed);
        warn!(job_id = %id, attempt, error = %failure, "Job failed");

        let blocked = self.block_dependents(id);
        if !blocked.is_empty() {
            JobMetrics::jobs_blocked(id.as_str(), blocked.len());
            warn!(
                job_id = %id,
                blocked = blocked.len(),
                "Blocked dependents of failed job"
            );
        }
    }

    /// Mark every transitive dependent of `failed` as blocked.
    ///
    /// Each job is visited at most once per run, however many failed
    /// ancestors it has. Returns the newly blocked jobs.
    fn block_dependents(&mut self, failed: &JobId) -> Vec<JobId> {
        let mut blocked = Vec::new();
        let mut stack: Vec<JobId> = self.graph.dependents(failed).iter().rev().cloned().collect();

        while let Some(id) = stack.pop() {
            if !self.blocked_visited.insert(id.clone()) {
                continue;
            }

            if let Some(entry) = self.entries.get_mut(&id) {
                if matches!(entry.state, JobState::Pending | JobState::Cancelled) {
                    entry.state = JobState::Blocked;
                    entry.blocked_by = Some(failed.clone());
                    self.tracker.update(&id, JobState::Blocked, entry.attempts);
                    debug!(job_id = %id, failed_job = %failed, "Job blocked");
                    blocked.push(id.clone());
                }
            }

            stack.extend(self.graph.dependents(&id).iter().rev().cloned());
        }

        blocked
    }

    /// Re-queue retries whose delay has elapsed.
    fn release_retries(&mut self, now: Instant) {
        while let Some(Reverse((at, _, _))) = self.retries.peek() {
            if *at > now {
                break;
            }
            let Some(Reverse((_, _, id))) = self.retries.pop() else {
                break;
            };

            let waiting = self
                .entries
                .get(&id)
                .is_some_and(|entry| entry.state == JobState::RetryPending);
            if waiting {
                debug!(job_id = %id, "Retry delay elapsed");
                self.make_ready(&id, now);
            }
        }
    }

    fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;

        let now = Instant::now();
        self.queue.drain();
        self.retries.clear();

        let mut count = 0;
        for (id, entry) in &mut self.entries {
            if matches!(
                entry.state,
                JobState::Pending | JobState::Ready | JobState::RetryPending
            ) {
                if let Some(since) = entry.waiting_since.take() {
                    entry.total_wait += now.saturating_duration_since(since);
                }
                entry.state = JobState::Cancelled;
                self.tracker.update(id, JobState::Cancelled, entry.attempts);
                count += 1;
            }
        }

        JobMetrics::jobs_cancelled(count);
        info!(cancelled = count, "Run cancelled, waiting for in-flight jobs");
    }

    fn finish(self, started_at: chrono::DateTime<Utc>) -> SchedulerResult<RunReport> {
        let finished_at = Utc::now();

        let mut jobs = BTreeMap::new();
        for (id, entry) in self.entries {
            if !entry.state.is_terminal() {
                error!(job_id = %id, state = %entry.state, "Job left unresolved at end of run");
                return Err(SchedulerError::Internal(format!(
                    "job {id} ended the run in state {}",
                    entry.state
                )));
            }

            jobs.insert(
                id,
                JobReport {
                    state: entry.state,
                    attempts: entry.attempts,
                    total_wait_time: entry.total_wait,
                    last_error: entry.last_error.map(|failure| failure.to_string()),
                    blocked_by: entry.blocked_by,
                },
            );
        }

        let summary = StatusSummary::from_states(jobs.values().map(|job| job.state));
        let status = if self.cancelled && summary.cancelled > 0 {
            RunStatus::Cancelled
        } else if summary.failed + summary.blocked > 0 {
            RunStatus::PartialSuccess
        } else {
            RunStatus::Success
        };

        SchedulerMetrics::run_finished(status);
        info!(
            status = %status,
            succeeded = summary.succeeded,
            failed = summary.failed,
            blocked = summary.blocked,
            cancelled = summary.cancelled,
            "Run finished"
        );

        Ok(RunReport {
            run_id: self.run_id,
            status,
            started_at,
            finished_at,
            jobs,
            dispatch_order: self.dispatch_order,
        })
    }
}

//! Common test infrastructure for scheduler integration tests.

#![allow(dead_code)]

use jobgraph_jobs::{JobContext, JobFailure, JobSpec, JobsConfig, Outcome};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Something a job action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(String, u32),
    Finished(String, u32),
}

/// Shared, ordered log of job events.
#[derive(Clone, Default)]
pub struct Trace {
    events: Arc<Mutex<Vec<Event>>>,
    attempts_at: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: Event) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Index of the first event equal to `event`.
    pub fn position(&self, event: &Event) -> usize {
        self.events
            .lock()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("event {event:?} not recorded"))
    }

    /// Order in which attempts started, as job ids.
    pub fn start_order(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Started(id, _) => Some(id.clone()),
                Event::Finished(..) => None,
            })
            .collect()
    }

    /// Start instants of every attempt of `id`.
    pub fn attempt_instants(&self, id: &str) -> Vec<Instant> {
        self.attempts_at
            .lock()
            .iter()
            .filter(|(job, _)| job == id)
            .map(|(_, at)| *at)
            .collect()
    }

    fn mark_start(&self, ctx: &JobContext) {
        self.record(Event::Started(ctx.job_id.to_string(), ctx.attempt));
        self.attempts_at
            .lock()
            .push((ctx.job_id.to_string(), Instant::now()));
    }
}

/// Tracks how many actions run at the same time.
#[derive(Clone, Default)]
pub struct ConcurrencyProbe {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Scheduler configuration with fast retries.
pub fn config(max_concurrency: usize) -> JobsConfig {
    let mut config = JobsConfig::default();
    config.scheduler.max_concurrency = max_concurrency;
    config.retry.base_delay_ms = 10;
    config.retry.max_delay_ms = 1_000;
    config
}

/// A job that records its attempts and then returns `outcome(attempt)`.
pub fn traced<F>(id: &str, trace: &Trace, outcome: F) -> JobSpec
where
    F: Fn(u32) -> Outcome + Send + Sync + 'static,
{
    let trace = trace.clone();
    let outcome = Arc::new(outcome);
    JobSpec::from_fn(id, move |ctx: JobContext| {
        let trace = trace.clone();
        let outcome = outcome.clone();
        async move {
            trace.mark_start(&ctx);
            let result = outcome(ctx.attempt);
            trace.record(Event::Finished(ctx.job_id.to_string(), ctx.attempt));
            result
        }
    })
}

/// A traced job that always succeeds.
pub fn ok_job(id: &str, trace: &Trace) -> JobSpec {
    traced(id, trace, |_| Ok(()))
}

/// A traced job that sleeps before succeeding.
pub fn slow_job(id: &str, trace: &Trace, duration: Duration) -> JobSpec {
    let trace = trace.clone();
    JobSpec::from_fn(id, move |ctx: JobContext| {
        let trace = trace.clone();
        async move {
            trace.mark_start(&ctx);
            tokio::time::sleep(duration).await;
            trace.record(Event::Finished(ctx.job_id.to_string(), ctx.attempt));
            Ok(())
        }
    })
}

/// A traced job that always fails with a transient error.
pub fn flaky_job(id: &str, trace: &Trace) -> JobSpec {
    traced(id, trace, |_| Err(JobFailure::transient("connection refused")))
}

/// A traced job that always fails with a permanent error.
pub fn broken_job(id: &str, trace: &Trace) -> JobSpec {
    traced(id, trace, |_| Err(JobFailure::permanent("exit status 1")))
}

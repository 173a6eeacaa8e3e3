//! Scheduler metrics.
//!
//! Recorded through the `metrics` facade; they are no-ops until the host
//! application installs a recorder.

use crate::report::RunStatus;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names.
pub mod names {
    /// Total attempts dispatched to a worker.
    pub const JOBS_DISPATCHED_TOTAL: &str = "jobgraph_jobs_dispatched_total";
    /// Total jobs that succeeded.
    pub const JOBS_SUCCEEDED_TOTAL: &str = "jobgraph_jobs_succeeded_total";
    /// Total jobs that failed terminally.
    pub const JOBS_FAILED_TOTAL: &str = "jobgraph_jobs_failed_total";
    /// Total retries scheduled.
    pub const JOBS_RETRIED_TOTAL: &str = "jobgraph_jobs_retried_total";
    /// Total jobs blocked by a failed dependency.
    pub const JOBS_BLOCKED_TOTAL: &str = "jobgraph_jobs_blocked_total";
    /// Total jobs cancelled.
    pub const JOBS_CANCELLED_TOTAL: &str = "jobgraph_jobs_cancelled_total";
    /// Total attempts that timed out.
    pub const JOBS_TIMED_OUT_TOTAL: &str = "jobgraph_jobs_timed_out_total";
    /// Total finished runs.
    pub const RUNS_TOTAL: &str = "jobgraph_runs_total";

    /// Attempt execution duration in seconds.
    pub const JOB_DURATION_SECONDS: &str = "jobgraph_job_duration_seconds";
    /// Time a job waited before dispatch in seconds.
    pub const JOB_WAIT_TIME_SECONDS: &str = "jobgraph_job_wait_time_seconds";

    /// Jobs currently in the ready queue.
    pub const READY_QUEUE_DEPTH: &str = "jobgraph_ready_queue_depth";
    /// Attempts currently executing.
    pub const WORKERS_ACTIVE: &str = "jobgraph_workers_active";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        names::JOBS_DISPATCHED_TOTAL,
        "Total number of job attempts dispatched"
    );
    describe_counter!(
        names::JOBS_SUCCEEDED_TOTAL,
        "Total number of jobs that succeeded"
    );
    describe_counter!(
        names::JOBS_FAILED_TOTAL,
        "Total number of jobs that failed"
    );
    describe_counter!(names::JOBS_RETRIED_TOTAL, "Total number of job retries");
    describe_counter!(
        names::JOBS_BLOCKED_TOTAL,
        "Total number of jobs blocked by a failed dependency"
    );
    describe_counter!(
        names::JOBS_CANCELLED_TOTAL,
        "Total number of jobs cancelled"
    );
    describe_counter!(
        names::JOBS_TIMED_OUT_TOTAL,
        "Total number of job attempts that timed out"
    );
    describe_counter!(names::RUNS_TOTAL, "Total number of finished runs");

    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Job attempt duration in seconds"
    );
    describe_histogram!(
        names::JOB_WAIT_TIME_SECONDS,
        "Job wait time before dispatch in seconds"
    );

    describe_gauge!(
        names::READY_QUEUE_DEPTH,
        "Current number of ready jobs"
    );
    describe_gauge!(
        names::WORKERS_ACTIVE,
        "Current number of executing job attempts"
    );
}

/// Per-job metrics recorder.
#[derive(Clone)]
pub struct JobMetrics;

impl JobMetrics {
    /// Record an attempt dispatched after waiting `wait_time`.
    pub fn job_dispatched(job_id: &str, attempt: u32, wait_time: Duration) {
        counter!(
            names::JOBS_DISPATCHED_TOTAL,
            "job_id" => job_id.to_string(),
            "attempt" => attempt.to_string()
        )
        .increment(1);

        histogram!(
            names::JOB_WAIT_TIME_SECONDS,
            "job_id" => job_id.to_string()
        )
        .record(wait_time.as_secs_f64());
    }

    /// Record a successful attempt.
    pub fn job_succeeded(job_id: &str, duration: Duration) {
        counter!(names::JOBS_SUCCEEDED_TOTAL, "job_id" => job_id.to_string()).increment(1);

        histogram!(
            names::JOB_DURATION_SECONDS,
            "job_id" => job_id.to_string(),
            "status" => "succeeded"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a terminal failure.
    pub fn job_failed(job_id: &str, error_kind: &str, duration: Duration) {
        counter!(
            names::JOBS_FAILED_TOTAL,
            "job_id" => job_id.to_string(),
            "error_kind" => error_kind.to_string()
        )
        .increment(1);

        histogram!(
            names::JOB_DURATION_SECONDS,
            "job_id" => job_id.to_string(),
            "status" => "failed"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a scheduled retry.
    pub fn job_retried(job_id: &str, attempt: u32) {
        counter!(
            names::JOBS_RETRIED_TOTAL,
            "job_id" => job_id.to_string(),
            "attempt" => attempt.to_string()
        )
        .increment(1);
    }

    /// Record jobs blocked by `failed_job`.
    pub fn jobs_blocked(failed_job: &str, count: usize) {
        counter!(
            names::JOBS_BLOCKED_TOTAL,
            "failed_job" => failed_job.to_string()
        )
        .increment(count as u64);
    }

    /// Record cancelled jobs.
    pub fn jobs_cancelled(count: usize) {
        counter!(names::JOBS_CANCELLED_TOTAL).increment(count as u64);
    }

    /// Record an attempt timeout.
    pub fn job_timed_out(job_id: &str) {
        counter!(names::JOBS_TIMED_OUT_TOTAL, "job_id" => job_id.to_string()).increment(1);
    }
}

/// Run-level metrics recorder.
#[derive(Clone)]
pub struct SchedulerMetrics;

impl SchedulerMetrics {
    /// Update queue depth and worker gauges.
    pub fn update_gauges(ready: usize, active: usize) {
        gauge!(names::READY_QUEUE_DEPTH).set(ready as f64);
        gauge!(names::WORKERS_ACTIVE).set(active as f64);
    }

    /// Record a finished run.
    pub fn run_finished(status: RunStatus) {
        counter!(names::RUNS_TOTAL, "status" => status.as_str()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        register_metrics();
    }

    #[test]
    fn test_recorders_without_installed_recorder() {
        JobMetrics::job_dispatched("build", 1, Duration::from_millis(5));
        JobMetrics::job_succeeded("build", Duration::from_secs(1));
        JobMetrics::job_failed("deploy", "permanent", Duration::from_secs(2));
        JobMetrics::job_retried("fetch", 2);
        JobMetrics::jobs_blocked("deploy", 3);
        JobMetrics::jobs_cancelled(1);
        JobMetrics::job_timed_out("fetch");
        SchedulerMetrics::update_gauges(4, 2);
        SchedulerMetrics::run_finished(RunStatus::Success);
    }
}

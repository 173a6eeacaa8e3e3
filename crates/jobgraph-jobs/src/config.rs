//! Scheduler configuration.

use crate::job::Priority;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the job scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Dispatch configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Default retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of jobs executing at once.
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,

    /// Per-attempt timeout in seconds (0 = unlimited).
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,

    /// Priority given to jobs that do not set one.
    #[serde(default)]
    pub default_priority: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_concurrency(),
            job_timeout_secs: default_job_timeout(),
            default_priority: 0,
        }
    }
}

impl SchedulerConfig {
    /// Get the per-attempt timeout, if any.
    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    /// Get the default priority.
    pub fn default_priority(&self) -> Priority {
        Priority(self.default_priority)
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
        .max(4)
}

fn default_job_timeout() -> u64 {
    300 // 5 minutes
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per job, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Maximum backoff delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0); no jitter when absent.
    #[serde(default)]
    pub jitter: Option<f64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: None,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    100
}

fn default_max_delay() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = JobsConfig::default();
        assert!(config.scheduler.max_concurrency >= 4);
        assert_eq!(config.scheduler.job_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.scheduler.default_priority(), Priority::NORMAL);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 100);
        assert_eq!(config.retry.max_delay_ms, 10_000);
        assert!(config.retry.jitter.is_none());
    }

    #[test]
    fn test_zero_timeout_disables_timeout() {
        let config = SchedulerConfig {
            job_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.job_timeout(), None);
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: JobsConfig =
            serde_json::from_str(r#"{"scheduler":{"max_concurrency":2},"retry":{"max_attempts":5}}"#)
                .unwrap();
        assert_eq!(config.scheduler.max_concurrency, 2);
        assert_eq!(config.scheduler.job_timeout_secs, 300);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.multiplier, 2.0);
    }
}

//! Retry policies for failed jobs.

use crate::config::RetryConfig;
use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry strategy enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// No retry.
    None,
    /// Fixed delay between retries.
    Fixed,
    /// Exponential backoff.
    Exponential,
    /// Linear backoff.
    Linear,
}

/// Retry policy configuration.
///
/// Attempts are counted from 1 and include the first execution, so
/// `max_attempts = 3` allows one initial run and two retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retry strategy.
    pub strategy: RetryStrategy,

    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Base delay in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds.
    pub max_delay_ms: u64,

    /// Backoff multiplier (exponential only).
    pub multiplier: f64,

    /// Add random jitter to delays.
    pub jitter: bool,

    /// Jitter factor (0.0 to 1.0).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3)
    }
}

impl RetryPolicy {
    /// Creates a policy that runs a job once.
    pub fn none() -> Self {
        Self {
            strategy: RetryStrategy::None,
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
            jitter: false,
            jitter_factor: 0.0,
        }
    }

    /// Creates a fixed delay retry policy.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        let delay_ms = duration_ms(delay);
        Self {
            strategy: RetryStrategy::Fixed,
            max_attempts,
            base_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            multiplier: 1.0,
            jitter: false,
            jitter_factor: 0.0,
        }
    }

    /// Creates an exponential backoff policy: 100ms doubling up to 10s.
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            max_attempts,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter: false,
            jitter_factor: 0.0,
        }
    }

    /// Creates a linear backoff policy.
    pub fn linear(max_attempts: u32, increment: Duration) -> Self {
        let increment_ms = duration_ms(increment);
        Self {
            strategy: RetryStrategy::Linear,
            max_attempts,
            base_delay_ms: increment_ms,
            max_delay_ms: increment_ms.saturating_mul(u64::from(max_attempts)),
            multiplier: 1.0,
            jitter: false,
            jitter_factor: 0.0,
        }
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = duration_ms(delay);
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = duration_ms(delay);
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enables jitter.
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter = true;
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Disables jitter.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self.jitter_factor = 0.0;
        self
    }

    /// Returns true if a job that just failed `attempt` should run again.
    pub fn should_retry(&self, attempt: u32, kind: ErrorKind) -> bool {
        self.strategy != RetryStrategy::None
            && kind == ErrorKind::Transient
            && attempt < self.max_attempts
    }

    /// Delay before the retry that follows failed attempt `attempt`.
    ///
    /// Exponential: `min(base * multiplier^(attempt - 1), max)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.strategy == RetryStrategy::None {
            return Duration::ZERO;
        }

        let base_delay = match self.strategy {
            RetryStrategy::None => 0,
            RetryStrategy::Fixed => self.base_delay_ms,
            RetryStrategy::Exponential => {
                let exp = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                let delay = self.base_delay_ms as f64 * self.multiplier.powi(exp);
                if delay.is_finite() && delay < u64::MAX as f64 {
                    delay as u64
                } else {
                    u64::MAX
                }
            }
            RetryStrategy::Linear => self.base_delay_ms.saturating_mul(u64::from(attempt)),
        };

        let capped_delay = base_delay.min(self.max_delay_ms);

        let final_delay = if self.jitter && self.jitter_factor > 0.0 {
            let jitter_range = (capped_delay as f64 * self.jitter_factor) as u64;
            let jitter = rand_jitter(jitter_range);
            capped_delay
                .saturating_add(jitter)
                .saturating_sub(jitter_range / 2)
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        let policy = RetryPolicy::exponential(config.max_attempts)
            .with_base_delay(Duration::from_millis(config.base_delay_ms))
            .with_max_delay(Duration::from_millis(config.max_delay_ms))
            .with_multiplier(config.multiplier);

        match config.jitter {
            Some(factor) => policy.with_jitter(factor),
            None => policy,
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Generate random jitter using a simple LCG.
fn rand_jitter(range: u64) -> u64 {
    use std::time::SystemTime;

    if range == 0 {
        return 0;
    }

    let seed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    let a: u64 = 6364136223846793005;
    let c: u64 = 1442695040888963407;

    let random = seed.wrapping_mul(a).wrapping_add(c);
    random % range
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_retry() {
        let policy = RetryPolicy::none();
        assert!(!policy.should_retry(1, ErrorKind::Transient));
        assert_eq!(policy.backoff_delay(1), Duration::ZERO);
    }

    #[test]
    fn test_should_retry_respects_attempt_cap() {
        let policy = RetryPolicy::exponential(3);

        assert!(policy.should_retry(1, ErrorKind::Transient));
        assert!(policy.should_retry(2, ErrorKind::Transient));
        assert!(!policy.should_retry(3, ErrorKind::Transient));
        assert!(!policy.should_retry(4, ErrorKind::Transient));
    }

    #[test]
    fn test_permanent_never_retried() {
        let policy = RetryPolicy::exponential(10);
        assert!(!policy.should_retry(1, ErrorKind::Permanent));
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::exponential(5)
            .with_base_delay(Duration::from_millis(1000))
            .with_max_delay(Duration::from_secs(60));

        assert_eq!(policy.backoff_delay(0), Duration::ZERO);
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = RetryPolicy::exponential(100)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500));

        assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(90), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn test_fixed_retry() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(5000));

        assert_eq!(policy.backoff_delay(1), Duration::from_millis(5000));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(5000));
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::linear(4, Duration::from_millis(1000));

        assert_eq!(policy.backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(3000));
    }

    #[test]
    fn test_jitter_stays_within_band() {
        let policy = RetryPolicy::exponential(3)
            .with_base_delay(Duration::from_millis(1000))
            .with_jitter(0.2);

        for _ in 0..50 {
            let delay = policy.backoff_delay(1);
            assert!(delay >= Duration::from_millis(900));
            assert!(delay <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn test_from_config() {
        let config = RetryConfig {
            max_attempts: 4,
            base_delay_ms: 50,
            max_delay_ms: 200,
            multiplier: 3.0,
            jitter: None,
        };
        let policy = RetryPolicy::from(&config);

        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(50));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(150));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(200));
    }
}

//! Configuration validation module.
//!
//! Rejects invalid configuration when it is loaded rather than when a run
//! starts.

use crate::AppConfig;
use jobgraph_core::TelemetryConfig;
use jobgraph_jobs::{RetryConfig, SchedulerConfig};
use std::fmt;
use url::Url;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    /// Worker pool must have at least one slot.
    InvalidConcurrency { value: usize },
    /// Jobs must be allowed at least one attempt.
    InvalidMaxAttempts { value: u32 },
    /// Base delay exceeds the delay cap.
    InvalidBackoffRange { base_ms: u64, max_ms: u64 },
    /// Backoff multiplier below 1 would shrink delays.
    InvalidMultiplier { value: f64 },
    /// Jitter factor must be between 0.0 and 1.0.
    InvalidJitter { value: f64 },
    /// URL format is invalid.
    InvalidUrl { url_type: String, message: String },
    /// Sampling ratio must be between 0.0 and 1.0.
    InvalidSamplingRatio { value: f64 },
    /// Log level is invalid.
    InvalidLogLevel { value: String },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConcurrency { value } => {
                write!(f, "Invalid max_concurrency: {value} (must be at least 1)")
            }
            Self::InvalidMaxAttempts { value } => {
                write!(f, "Invalid max_attempts: {value} (must be at least 1)")
            }
            Self::InvalidBackoffRange { base_ms, max_ms } => {
                write!(
                    f,
                    "Invalid backoff: base delay ({base_ms}ms) cannot be greater than max delay ({max_ms}ms)"
                )
            }
            Self::InvalidMultiplier { value } => {
                write!(f, "Invalid backoff multiplier: {value} (must be at least 1.0)")
            }
            Self::InvalidJitter { value } => {
                write!(f, "Invalid jitter factor: {value} (must be between 0.0 and 1.0)")
            }
            Self::InvalidUrl { url_type, message } => {
                write!(f, "Invalid {url_type} URL: {message}")
            }
            Self::InvalidSamplingRatio { value } => {
                write!(
                    f,
                    "Invalid sampling ratio: {value} (must be between 0.0 and 1.0)"
                )
            }
            Self::InvalidLogLevel { value } => {
                write!(
                    f,
                    "Invalid log level: '{value}' (valid: trace, debug, info, warn, error)"
                )
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Result of configuration validation containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ConfigValidationError>,
}

impl ValidationResult {
    fn add_error(&mut self, error: ConfigValidationError) {
        self.errors.push(error);
    }

    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the validation errors.
    pub fn errors(&self) -> &[ConfigValidationError] {
        &self.errors
    }

    /// Converts to Result, returning Err with all errors if any exist.
    pub fn into_result(self) -> Result<(), Vec<ConfigValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Valid log levels.
    const VALID_LOG_LEVELS: &'static [&'static str] = &["trace", "debug", "info", "warn", "error"];

    /// Validates the entire application configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut result = ValidationResult::default();

        Self::validate_scheduler(&config.jobs.scheduler, &mut result);
        Self::validate_retry(&config.jobs.retry, &mut result);
        Self::validate_observability(&config.observability, &mut result);

        result.into_result()
    }

    fn validate_scheduler(config: &SchedulerConfig, result: &mut ValidationResult) {
        if config.max_concurrency == 0 {
            result.add_error(ConfigValidationError::InvalidConcurrency {
                value: config.max_concurrency,
            });
        }
    }

    fn validate_retry(config: &RetryConfig, result: &mut ValidationResult) {
        if config.max_attempts == 0 {
            result.add_error(ConfigValidationError::InvalidMaxAttempts {
                value: config.max_attempts,
            });
        }

        if config.base_delay_ms > config.max_delay_ms {
            result.add_error(ConfigValidationError::InvalidBackoffRange {
                base_ms: config.base_delay_ms,
                max_ms: config.max_delay_ms,
            });
        }

        if config.multiplier.is_nan() || config.multiplier < 1.0 {
            result.add_error(ConfigValidationError::InvalidMultiplier {
                value: config.multiplier,
            });
        }

        if let Some(jitter) = config.jitter {
            if !(0.0..=1.0).contains(&jitter) {
                result.add_error(ConfigValidationError::InvalidJitter { value: jitter });
            }
        }
    }

    fn validate_observability(config: &TelemetryConfig, result: &mut ValidationResult) {
        let level = config.log_level.to_lowercase();
        if !Self::VALID_LOG_LEVELS.contains(&level.as_str()) {
            result.add_error(ConfigValidationError::InvalidLogLevel {
                value: config.log_level.clone(),
            });
        }

        if !(0.0..=1.0).contains(&config.sampling_ratio) {
            result.add_error(ConfigValidationError::InvalidSamplingRatio {
                value: config.sampling_ratio,
            });
        }

        if let Some(ref endpoint) = config.otlp_endpoint {
            if let Err(e) = Url::parse(endpoint) {
                result.add_error(ConfigValidationError::InvalidUrl {
                    url_type: "otlp_endpoint".to_string(),
                    message: format!("{endpoint}: {e}"),
                });
            }
        }
    }
}

/// Formats validation errors for display.
pub fn format_validation_errors(errors: &[ConfigValidationError]) -> String {
    let mut output = String::from("Configuration validation failed:\n");
    for (i, error) in errors.iter().enumerate() {
        output.push_str(&format!("  {}. {}\n", i + 1, error));
    }
    output
}

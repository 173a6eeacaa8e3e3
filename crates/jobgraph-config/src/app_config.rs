//! Application configuration structures.

use jobgraph_core::{JobgraphError, JobgraphResult, TelemetryConfig};
use jobgraph_jobs::JobsConfig;
use serde::{Deserialize, Serialize};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Scheduler and retry configuration.
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Logging and tracing configuration.
    #[serde(default)]
    pub observability: TelemetryConfig,
}

impl AppConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(source: &str) -> JobgraphResult<Self> {
        toml::from_str(source).map_err(|e| JobgraphError::configuration(e.to_string()))
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> JobgraphResult<String> {
        toml::to_string_pretty(self).map_err(|e| JobgraphError::internal(e.to_string()))
    }

    /// Returns true when running in production.
    pub fn is_production(&self) -> bool {
        self.app.environment.eq_ignore_ascii_case("production")
    }
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Application name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Application version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Environment (development, staging, production).
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
            environment: default_environment(),
        }
    }
}

fn default_name() -> String {
    "jobgraph".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.app.name, "jobgraph");
        assert_eq!(config.app.environment, "development");
        assert_eq!(config.jobs.retry.max_attempts, 3);
        assert_eq!(config.observability.service_name, "jobgraph");
        assert!(!config.is_production());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [app]
            environment = "production"

            [jobs.scheduler]
            max_concurrency = 16
            "#,
        )
        .unwrap();

        assert!(config.is_production());
        assert_eq!(config.app.name, "jobgraph");
        assert_eq!(config.jobs.scheduler.max_concurrency, 16);
        assert_eq!(config.jobs.scheduler.job_timeout_secs, 300);
        assert_eq!(config.jobs.retry.base_delay_ms, 100);
    }

    #[test]
    fn test_toml_round_trip_preserves_overrides() {
        let mut config = AppConfig::default();
        config.jobs.retry.max_attempts = 7;
        config.observability.log_level = "debug".to_string();

        let text = config.to_toml_string().unwrap();
        let parsed = AppConfig::from_toml_str(&text).unwrap();

        assert_eq!(parsed.jobs.retry.max_attempts, 7);
        assert_eq!(parsed.observability.log_level, "debug");
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = AppConfig::from_toml_str("[jobs.scheduler]\nmax_concurrency = \"many\"").unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }
}

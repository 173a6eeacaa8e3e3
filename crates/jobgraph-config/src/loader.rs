//! Configuration loader with layered sources.

use crate::{format_validation_errors, AppConfig, ConfigValidator};
use config::{Config, ConfigError, Environment, File};
use jobgraph_core::{JobgraphError, JobgraphResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Prefix of environment variable overrides (`JOBGRAPH__JOBS__RETRY__MAX_ATTEMPTS`).
pub const ENV_PREFIX: &str = "JOBGRAPH";

/// Variable selecting the environment-specific config file.
pub const ENVIRONMENT_VAR: &str = "JOBGRAPH_ENVIRONMENT";

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `{dir}/default.toml` - Default values
    /// 2. `{dir}/{environment}.toml` - Environment-specific overrides
    /// 3. `{dir}/local.toml` - Local overrides
    /// 4. Environment variables with `JOBGRAPH__` prefix
    ///
    /// Missing files are skipped. The result is validated before it is
    /// returned.
    pub fn new(config_dir: impl Into<PathBuf>) -> JobgraphResult<Self> {
        let config_dir = config_dir.into();
        let config = Self::load_config(&config_dir)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> JobgraphResult<Self> {
        Self::new("./config")
    }

    /// Directory the configuration is read from.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    ///
    /// On error the previous configuration stays in effect.
    pub async fn reload(&self) -> JobgraphResult<()> {
        let new_config = Self::load_config(&self.config_dir)?;
        *self.config.write().await = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Gets a specific configuration value by dotted key path.
    pub async fn get_value<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let config = self.config.read().await;
        let json = serde_json::to_value(&*config).ok()?;

        let mut current = &json;
        for part in key.split('.') {
            current = current.get(part)?;
        }

        serde_json::from_value(current.clone()).ok()
    }

    fn load_config(config_dir: &Path) -> JobgraphResult<AppConfig> {
        if let Err(e) = dotenvy::dotenv() {
            debug!(error = %e, "No .env file loaded");
        }

        let environment =
            std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "development".to_string());

        info!(
            environment = %environment,
            config_dir = %config_dir.display(),
            "Loading configuration"
        );

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = config_dir.join(format!("{name}.toml"));
            if path.exists() {
                debug!(path = %path.display(), "Loading config file");
                builder = builder.add_source(File::from(path.as_path()).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let app_config: AppConfig = builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(config_error_to_jobgraph_error)?;

        ConfigValidator::validate(&app_config)
            .map_err(|errors| JobgraphError::Configuration(format_validation_errors(&errors)))?;

        Ok(app_config)
    }
}

fn config_error_to_jobgraph_error(err: ConfigError) -> JobgraphError {
    JobgraphError::Configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, config: &toml::Value) {
        fs::write(
            dir.path().join(name),
            toml::to_string(config).expect("Failed to render TOML"),
        )
        .expect("Failed to write config file");
    }

    fn table(source: &str) -> toml::Value {
        source.parse::<toml::Table>().map(toml::Value::Table).expect("Invalid TOML")
    }

    #[tokio::test]
    async fn test_empty_dir_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new(dir.path()).unwrap();
        let config = loader.get().await;

        assert_eq!(config.app.name, "jobgraph");
        assert_eq!(config.jobs.scheduler.job_timeout_secs, 300);
        assert_eq!(loader.config_dir(), dir.path());
    }

    #[tokio::test]
    async fn test_local_overrides_default() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "default.toml",
            &table("[jobs.scheduler]\nmax_concurrency = 2\njob_timeout_secs = 60\n"),
        );
        write(&dir, "local.toml", &table("[jobs.scheduler]\nmax_concurrency = 6\n"));

        let config = ConfigLoader::new(dir.path()).unwrap().get().await;

        assert_eq!(config.jobs.scheduler.max_concurrency, 6);
        assert_eq!(config.jobs.scheduler.job_timeout_secs, 60);
    }

    #[tokio::test]
    async fn test_invalid_file_fails_validation() {
        let dir = TempDir::new().unwrap();
        write(&dir, "default.toml", &table("[jobs.retry]\nmax_attempts = 0\n"));

        let err = ConfigLoader::new(dir.path()).err().expect("Expected validation failure");
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
        assert!(err.to_string().contains("max_attempts"));
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let dir = TempDir::new().unwrap();
        write(&dir, "default.toml", &table("[observability]\nlog_level = \"info\"\n"));
        let loader = ConfigLoader::new(dir.path()).unwrap();

        write(&dir, "default.toml", &table("[observability]\nlog_level = \"debug\"\n"));
        loader.reload().await.unwrap();

        assert_eq!(
            loader.get_value::<String>("observability.log_level").await,
            Some("debug".to_string())
        );
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_config() {
        let dir = TempDir::new().unwrap();
        write(&dir, "default.toml", &table("[jobs.scheduler]\nmax_concurrency = 3\n"));
        let loader = ConfigLoader::new(dir.path()).unwrap();

        write(&dir, "default.toml", &table("[jobs.scheduler]\nmax_concurrency = 0\n"));
        assert!(loader.reload().await.is_err());

        assert_eq!(
            loader.get_value::<usize>("jobs.scheduler.max_concurrency").await,
            Some(3)
        );
    }

    #[tokio::test]
    async fn test_get_value_missing_key() {
        let dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new(dir.path()).unwrap();

        assert_eq!(loader.get_value::<u32>("jobs.retry.max_attempts").await, Some(3));
        assert_eq!(loader.get_value::<u32>("jobs.retry.nope").await, None);
        assert_eq!(loader.get_value::<u32>("app.name").await, None);
    }
}

//! Tracing subscriber bootstrap.
//!
//! Installs an `EnvFilter`-driven `tracing-subscriber` registry with a text or
//! JSON console layer. With the `telemetry` feature enabled and an OTLP
//! endpoint configured, spans are also exported through OpenTelemetry.

#[cfg(feature = "telemetry")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "telemetry")]
use opentelemetry::KeyValue;
#[cfg(feature = "telemetry")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "telemetry")]
use opentelemetry_sdk::{
    runtime,
    trace::{RandomIdGenerator, Sampler},
    Resource,
};
#[cfg(feature = "telemetry")]
use opentelemetry_semantic_conventions::resource::SERVICE_NAME;

use crate::{JobgraphError, JobgraphResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info,jobgraph=debug";

/// Console log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether OpenTelemetry export is enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Service name attached to exported spans.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// OTLP endpoint URL (e.g., "http://localhost:4317").
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Sampling ratio (0.0 to 1.0).
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,

    /// Whether to write events to stdout.
    #[serde(default = "default_console_output")]
    pub console_output: bool,

    /// Console output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Base level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_service_name() -> String {
    "jobgraph".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

fn default_console_output() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: default_service_name(),
            otlp_endpoint: None,
            sampling_ratio: default_sampling_ratio(),
            console_output: default_console_output(),
            format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}

impl TelemetryConfig {
    /// Filter directive derived from the configured base level.
    pub fn filter_directive(&self) -> String {
        if self.log_level == "info" {
            DEFAULT_FILTER.to_string()
        } else {
            format!("{},jobgraph={}", self.log_level, self.log_level)
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> JobgraphResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    let text_layer = (config.console_output && config.format == LogFormat::Text)
        .then(|| tracing_subscriber::fmt::layer().with_target(true));
    let json_layer = (config.console_output && config.format == LogFormat::Json)
        .then(|| tracing_subscriber::fmt::layer().json().with_current_span(true));

    #[cfg(feature = "telemetry")]
    let otel_layer = build_tracer(config)?
        .map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));
    #[cfg(not(feature = "telemetry"))]
    let otel_layer: Option<tracing_subscriber::layer::Identity> = {
        if config.enabled {
            tracing::warn!("OpenTelemetry export requested but the `telemetry` feature is disabled");
        }
        None
    };

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .try_init()
        .map_err(|e| JobgraphError::Telemetry(e.to_string()))?;

    tracing::info!(
        service_name = %config.service_name,
        format = ?config.format,
        otlp_endpoint = ?config.otlp_endpoint,
        "Telemetry initialized"
    );

    Ok(())
}

#[cfg(feature = "telemetry")]
fn build_tracer(config: &TelemetryConfig) -> JobgraphResult<Option<opentelemetry_sdk::trace::Tracer>> {
    if !config.enabled {
        return Ok(None);
    }
    let Some(endpoint) = &config.otlp_endpoint else {
        return Ok(None);
    };

    let sampler = if config.sampling_ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if config.sampling_ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(config.sampling_ratio)
    };

    let resource = Resource::new(vec![KeyValue::new(
        SERVICE_NAME,
        config.service_name.clone(),
    )]);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| JobgraphError::Telemetry(format!("Failed to create OTLP exporter: {}", e)))?;

    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_sampler(sampler)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("jobgraph");
    opentelemetry::global::set_tracer_provider(provider);

    Ok(Some(tracer))
}

/// Flush pending spans and shut down the exporter.
#[cfg(feature = "telemetry")]
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
    tracing::info!("Telemetry shutdown complete");
}

/// No exporter is installed without the `telemetry` feature.
#[cfg(not(feature = "telemetry"))]
pub fn shutdown_telemetry() {}

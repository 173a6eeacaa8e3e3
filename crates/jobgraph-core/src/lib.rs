//! # Jobgraph Core
//!
//! Error definitions and telemetry bootstrap shared by the jobgraph crates.

pub mod error;
pub mod result;
pub mod telemetry;

pub use error::*;
pub use result::*;
pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat, TelemetryConfig};

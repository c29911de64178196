//! Observability for the Aegis security chain.
//!
//! - **Logging**: structured JSON (or pretty) logs through `tracing-subscriber`
//! - **Metrics**: Prometheus-format counters via the `metrics` crate
//!
//! # Chain Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `aegis_chain_requests_total` | Counter | `outcome` | Chain passes by outcome |
//! | `aegis_chain_duration_seconds` | Histogram | - | Time spent inside the chain |
//! | `aegis_stage_short_circuits_total` | Counter | `stage` | Short-circuits per stage |
//! | `aegis_cors_rejections_total` | Counter | `reason` | CORS rejections per reason |
//!
//! # Example
//!
//! ```rust,ignore
//! use aegis_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::builder()
//!     .service_name("edge-gateway")
//!     .metrics_addr("0.0.0.0:9090")
//!     .build();
//!
//! init_telemetry(&config)?;
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use metrics::{init_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging and metrics.
///
/// Logging is initialized first so that metrics installation failures are
/// reported through the configured subscriber.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    ::tracing::info!(service = %config.service_name, "telemetry initialized");
    Ok(())
}

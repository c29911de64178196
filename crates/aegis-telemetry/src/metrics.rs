//! Prometheus metrics for the security chain.
//!
//! The recording helpers are safe to call before [`init_metrics`]: without an
//! installed recorder the `metrics` macros are no-ops.
//!
//! # Example
//!
//! ```rust,ignore
//! use aegis_telemetry::metrics::{record_chain_outcome, record_stage_short_circuit};
//!
//! record_stage_short_circuit("cors");
//! record_chain_outcome(true);
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Total chain passes, labelled by `outcome`.
pub const CHAIN_REQUESTS_TOTAL: &str = "aegis_chain_requests_total";

/// Time spent inside the chain.
pub const CHAIN_DURATION_SECONDS: &str = "aegis_chain_duration_seconds";

/// Short-circuits, labelled by `stage`.
pub const STAGE_SHORT_CIRCUITS_TOTAL: &str = "aegis_stage_short_circuits_total";

/// CORS rejections, labelled by `reason`.
pub const CORS_REJECTIONS_TOTAL: &str = "aegis_cors_rejections_total";

/// How often histogram buckets are drained.
pub const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether the Prometheus exporter is installed.
    pub enabled: bool,

    /// Address the scrape endpoint listens on (e.g., "0.0.0.0:9090").
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Installs the Prometheus recorder and starts its HTTP scrape listener.
///
/// Inside a Tokio runtime the exporter is spawned onto that runtime;
/// otherwise it gets a single-threaded runtime on a background thread.
/// A second background thread runs histogram upkeep every
/// [`UPKEEP_INTERVAL`].
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` if `addr` is not a socket
/// address, or `TelemetryError::MetricsInit` if the listener cannot be bound
/// or a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    let builder = PrometheusBuilder::new().with_http_listener(addr);
    let recorder = match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            let (recorder, exporter) = {
                let _guard = runtime.enter();
                builder.build().map_err(metrics_init)?
            };
            runtime.spawn(exporter);
            recorder
        }
        Err(_) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(metrics_init)?;
            let (recorder, exporter) = {
                let _guard = runtime.enter();
                builder.build().map_err(metrics_init)?
            };
            thread::Builder::new()
                .name("aegis-metrics-exporter".to_string())
                .spawn(move || runtime.block_on(exporter))
                .map_err(metrics_init)?;
            recorder
        }
    };

    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(metrics_init)?;
    spawn_upkeep(handle.clone())?;

    let _ = METRICS_HANDLE.set(handle);
    describe_chain_metrics();
    ::tracing::info!(%addr, "prometheus scrape endpoint listening");

    Ok(())
}

fn spawn_upkeep(handle: PrometheusHandle) -> TelemetryResult<()> {
    thread::Builder::new()
        .name("aegis-metrics-upkeep".to_string())
        .spawn(move || loop {
            thread::sleep(UPKEEP_INTERVAL);
            handle.run_upkeep();
        })
        .map(|_| ())
        .map_err(metrics_init)
}

fn metrics_init(e: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::MetricsInit(e.to_string())
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn describe_chain_metrics() {
    describe_counter!(
        CHAIN_REQUESTS_TOTAL,
        "Requests passed through the security chain, by outcome"
    );
    describe_histogram!(
        CHAIN_DURATION_SECONDS,
        "Time spent executing the security chain in seconds"
    );
    describe_counter!(
        STAGE_SHORT_CIRCUITS_TOTAL,
        "Chain executions halted by a stage, by stage name"
    );
    describe_counter!(
        CORS_REJECTIONS_TOTAL,
        "Cross-origin requests rejected by the CORS stage, by reason"
    );
}

/// Records the outcome of one chain execution.
pub fn record_chain_outcome(short_circuited: bool) {
    let outcome = if short_circuited {
        "short_circuited"
    } else {
        "continued"
    };
    counter!(CHAIN_REQUESTS_TOTAL, "outcome" => outcome).increment(1);
}

/// Records how long a chain execution took.
pub fn record_chain_duration(duration: Duration) {
    histogram!(CHAIN_DURATION_SECONDS).record(duration.as_secs_f64());
}

/// Records that `stage` halted the chain.
pub fn record_stage_short_circuit(stage: &'static str) {
    counter!(STAGE_SHORT_CIRCUITS_TOTAL, "stage" => stage).increment(1);
}

/// Records a CORS rejection.
///
/// `reason` is a short, low-cardinality token such as `origin`, `method`
/// or `headers`.
pub fn record_cors_rejection(reason: &'static str) {
    counter!(CORS_REJECTIONS_TOTAL, "reason" => reason).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.addr, "0.0.0.0:9090");
    }

    #[test]
    fn test_invalid_address() {
        let config = MetricsConfig {
            enabled: true,
            addr: "not-an-address".to_string(),
        };
        assert!(matches!(
            init_metrics(&config),
            Err(TelemetryError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_record_functions_without_recorder() {
        record_chain_outcome(true);
        record_chain_outcome(false);
        record_chain_duration(Duration::from_micros(40));
        record_stage_short_circuit("cors");
        record_cors_rejection("origin");
    }

    #[test]
    fn test_init_metrics_serves_scrape_endpoint() {
        use std::io::{Read, Write};
        use std::net::TcpStream;

        let addr = "127.0.0.1:39517";
        init_metrics(&MetricsConfig {
            enabled: true,
            addr: addr.to_string(),
        })
        .unwrap();
        record_chain_outcome(true);

        let mut stream = (0..50)
            .find_map(|_| {
                TcpStream::connect(addr).ok().or_else(|| {
                    thread::sleep(Duration::from_millis(20));
                    None
                })
            })
            .expect("scrape listener never accepted a connection");
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(CHAIN_REQUESTS_TOTAL));
        assert!(render_metrics().unwrap().contains(CHAIN_REQUESTS_TOTAL));
    }
}

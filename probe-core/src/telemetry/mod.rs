//! Telemetry
//!
//! Structured logging, the probe metrics and their exposition.

pub mod export;
pub mod logging;
pub mod metrics;

use thiserror::Error;

pub use export::{
    install_exporter, metrics_router, prometheus_builder, serve_metrics, ExporterState,
    HealthResponse, MetricsExporterConfig,
};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use self::metrics::{
    describe_metrics, InMemoryMetrics, MetricsSink, MetricsSnapshot, RecorderMetrics,
    AVAILABILITY_GAUGE, ERRORS_COUNTER, LATENCY_BUCKETS, LATENCY_HISTOGRAM,
};

/// Telemetry initialization errors
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Logging initialization failed: {0}")]
    Logging(String),

    #[error("Metrics exporter failed: {0}")]
    Exporter(String),

    #[error("Failed to bind metrics listener on {addr}: {reason}")]
    Bind { addr: String, reason: String },
}

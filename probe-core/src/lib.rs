//! Probe Core
//!
//! Synthetic availability probing for an S3-compatible bucket: every tick
//! writes a reference object, reads it back, checks it byte for byte and
//! deletes it, reporting availability, errors and latency as metrics.
//!
//! # Components
//!
//! - [`identity`]: per-cycle object names and staging paths
//! - [`comparator`]: byte-exact payload comparison
//! - [`cycle`]: the write/settle/read/compare/delete state machine
//! - [`dispatcher`]: fixed-period scheduling with an in-flight ceiling
//! - [`config`]: environment configuration
//! - [`telemetry`]: logging, metrics and exposition

pub mod comparator;
pub mod config;
pub mod cycle;
pub mod dispatcher;
pub mod error;
pub mod identity;
pub mod telemetry;

pub use comparator::{compare_bytes, compare_files, Comparison};
pub use config::{ConfigError, MetricsMode, ProbeConfig};
pub use cycle::{CycleOutcome, LastCycle, ProbeSettings, ProbeStatus, Prober, COMPARISON_FAILED};
pub use dispatcher::{
    DispatchError, DispatchStats, Dispatcher, DispatcherConfig, DispatcherHandle, RunMode,
};
pub use error::{ProbeError, ProbeResult};
pub use identity::{IdentityError, IdentityGenerator, ProbeIdentity};
pub use telemetry::{
    InMemoryMetrics, LogConfig, MetricsExporterConfig, MetricsSink, RecorderMetrics,
    TelemetryError,
};

//! Prober Error Types

use probe_storage::StoreError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatcher::DispatchError;
use crate::identity::IdentityError;
use crate::telemetry::TelemetryError;

/// Top-level prober errors
///
/// Probe failures never surface here; a cycle absorbs them into metrics.
/// These are startup and dispatch faults.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

/// Prober result type
pub type ProbeResult<T> = Result<T, ProbeError>;

//! Probe Cycle
//!
//! One cycle writes the reference payload under a fresh identity, waits for
//! the store to settle, reads the object back into a staging file, compares
//! it byte for byte and finally deletes the object.
//!
//! Stage failures are absorbed here: they become metric updates and a
//! [`CycleOutcome`], never an error returned to the dispatcher.
//!
//! | Outcome       | Gauge     | Error label           | Delete                      |
//! |---------------|-----------|-----------------------|-----------------------------|
//! | `Success`     | 1         | -                     | yes                         |
//! | `WriteFailed` | unchanged | store error           | no                          |
//! | `ReadFailed`  | 0         | store error           | no                          |
//! | `Mismatch`    | 0         | `comparison failed`   | if `cleanup_on_mismatch`    |

use chrono::{DateTime, Utc};
use probe_storage::{ObjectStore, PutOptions, StoreOperation, StoreResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::comparator::{compare_files, Comparison};
use crate::identity::ProbeIdentity;
use crate::telemetry::MetricsSink;

/// Error label recorded when the downloaded copy differs from the reference
pub const COMPARISON_FAILED: &str = "comparison failed";

/// Result of one probe cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Object written, read back intact (delete result does not matter)
    Success,
    /// Upload failed; nothing else ran
    WriteFailed,
    /// Download failed; no comparison ran
    ReadFailed,
    /// Downloaded copy differs from the reference
    Mismatch,
}

impl CycleOutcome {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::WriteFailed => "write_failed",
            Self::ReadFailed => "read_failed",
            Self::Mismatch => "mismatch",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-cycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Target bucket
    pub bucket: String,
    /// Reference payload uploaded by every cycle
    pub reference_path: PathBuf,
    /// Directory for staging files
    pub staging_dir: PathBuf,
    /// ACL and content type for uploads
    pub put_options: PutOptions,
    /// Pause between write and read-back
    pub settle_delay: Duration,
    /// Delete the probe object after a mismatch
    pub cleanup_on_mismatch: bool,
}

impl ProbeSettings {
    /// Settings with defaults for everything but bucket and reference file
    pub fn new(bucket: &str, reference_path: impl Into<PathBuf>) -> Self {
        Self {
            bucket: bucket.to_string(),
            reference_path: reference_path.into(),
            staging_dir: PathBuf::from("."),
            put_options: PutOptions::default(),
            settle_delay: Duration::from_secs(1),
            cleanup_on_mismatch: true,
        }
    }

    /// Set the staging directory
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    /// Set the settle delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the cleanup-on-mismatch policy
    pub fn with_cleanup_on_mismatch(mut self, enabled: bool) -> Self {
        self.cleanup_on_mismatch = enabled;
        self
    }

    /// Set upload options
    pub fn with_put_options(mut self, options: PutOptions) -> Self {
        self.put_options = options;
        self
    }
}

/// Last completed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LastCycle {
    pub outcome: CycleOutcome,
    pub finished_at: DateTime<Utc>,
}

/// Shared record of completed cycles, read by the health endpoint
///
/// Like the gauge, `last` is whichever cycle finished most recently.
#[derive(Debug, Default)]
pub struct ProbeStatus {
    last: Mutex<Option<LastCycle>>,
    completed: AtomicU64,
}

impl ProbeStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished cycle
    pub fn record(&self, outcome: CycleOutcome) {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        *last = Some(LastCycle {
            outcome,
            finished_at: Utc::now(),
        });
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Most recently finished cycle
    pub fn last(&self) -> Option<LastCycle> {
        *self.last.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Number of finished cycles
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Runs probe cycles against one store
pub struct Prober {
    store: Arc<dyn ObjectStore>,
    metrics: Arc<dyn MetricsSink>,
    settings: ProbeSettings,
    status: Arc<ProbeStatus>,
}

impl Prober {
    /// Create a new prober
    pub fn new(
        store: Arc<dyn ObjectStore>,
        metrics: Arc<dyn MetricsSink>,
        settings: ProbeSettings,
    ) -> Self {
        Self {
            store,
            metrics,
            settings,
            status: Arc::new(ProbeStatus::new()),
        }
    }

    /// Share an existing status record
    pub fn with_status(mut self, status: Arc<ProbeStatus>) -> Self {
        self.status = status;
        self
    }

    /// Status record updated after every cycle
    pub fn status(&self) -> Arc<ProbeStatus> {
        self.status.clone()
    }

    /// Settings in use
    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Run one full cycle for `identity`
    pub async fn run_cycle(&self, identity: &ProbeIdentity) -> CycleOutcome {
        let span = info_span!("probe_cycle", identity = %identity);
        let started = Instant::now();
        let outcome = self.execute(identity).instrument(span.clone()).await;

        span.in_scope(|| {
            info!(
                outcome = %outcome,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Probe cycle finished"
            );
        });
        self.status.record(outcome);
        outcome
    }

    async fn execute(&self, identity: &ProbeIdentity) -> CycleOutcome {
        let bucket = self.settings.bucket.as_str();
        let key = identity.as_str();

        let put = self.store.put(
            bucket,
            key,
            &self.settings.reference_path,
            &self.settings.put_options,
        );
        if let Err(err) = self.timed(StoreOperation::Put, put).await {
            warn!(stage = "put", error = %err, "Probe write failed");
            self.metrics.record_error(&err.to_string());
            return CycleOutcome::WriteFailed;
        }

        tokio::time::sleep(self.settings.settle_delay).await;

        let staging = identity.staging_path(&self.settings.staging_dir);
        let get = self.store.get(bucket, key, &staging);
        if let Err(err) = self.timed(StoreOperation::Get, get).await {
            warn!(stage = "get", error = %err, "Probe read failed");
            self.metrics.set_availability(false);
            self.metrics.record_error(&err.to_string());
            remove_staging(&staging).await;
            return CycleOutcome::ReadFailed;
        }

        let outcome = match compare_files(&self.settings.reference_path, &staging).await {
            Ok(Comparison::Match) => {
                debug!("Probe payload verified");
                self.metrics.set_availability(true);
                CycleOutcome::Success
            }
            Ok(Comparison::Mismatch { offset }) => {
                warn!(stage = "compare", offset, "Probe payload mismatch");
                self.metrics.record_error(COMPARISON_FAILED);
                self.metrics.set_availability(false);
                CycleOutcome::Mismatch
            }
            Err(err) => {
                warn!(stage = "compare", error = %err, "Probe payload could not be compared");
                self.metrics.record_error(&err.to_string());
                self.metrics.set_availability(false);
                CycleOutcome::Mismatch
            }
        };

        remove_staging(&staging).await;

        if outcome.is_success() || self.settings.cleanup_on_mismatch {
            self.delete(identity).await;
        }

        outcome
    }

    /// Best-effort removal of the probe object
    async fn delete(&self, identity: &ProbeIdentity) {
        let delete = self.store.delete(&self.settings.bucket, identity.as_str());
        if let Err(err) = self.timed(StoreOperation::Delete, delete).await {
            warn!(stage = "delete", error = %err, "Probe cleanup failed");
            self.metrics.record_error(&err.to_string());
        }
    }

    /// Await a store call, recording its latency only when it succeeds
    async fn timed<F>(&self, operation: StoreOperation, call: F) -> StoreResult<()>
    where
        F: Future<Output = StoreResult<()>>,
    {
        let started = Instant::now();
        let result = call.await;
        if result.is_ok() {
            self.metrics.observe_latency(operation, started.elapsed());
        }
        result
    }
}

async fn remove_staging(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to remove staging file");
        }
    }
}

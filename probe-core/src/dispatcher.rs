//! Probe Dispatcher
//!
//! Launches a probe cycle on every tick of a fixed-period interval without
//! waiting for earlier cycles. A semaphore caps how many cycles may be in
//! flight; a tick that finds no free permit is skipped rather than queued,
//! so the schedule never drifts behind a slow store.
//!
//! Cycle tasks live in a `JoinSet`. A cycle that panics is reaped and
//! logged; the loop carries on with the next tick.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cycle::{CycleOutcome, Prober};
use crate::identity::{IdentityGenerator, ProbeIdentity};

/// How the dispatcher schedules cycles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Tick forever until stopped
    #[default]
    Continuous,
    /// Run one cycle and return its outcome
    Once,
}

impl RunMode {
    /// Parse from string (for environment variables)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "continuous" => Some(Self::Continuous),
            "once" | "single" => Some(Self::Once),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::Once => "once",
        }
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Period between launches
    pub interval: Duration,
    /// Scheduling mode
    pub run_mode: RunMode,
    /// Maximum concurrently running cycles
    pub max_in_flight: usize,
    /// Let in-flight cycles finish on stop instead of aborting them
    ///
    /// An aborted cycle skips its cleanup: the object it wrote stays in the
    /// bucket and an `output-*` staging file may stay in the staging dir.
    pub drain_on_shutdown: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            run_mode: RunMode::Continuous,
            max_in_flight: 4,
            drain_on_shutdown: true,
        }
    }
}

/// Dispatcher errors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Probe cycle {identity} faulted: {reason}")]
    CycleFault { identity: String, reason: String },

    #[error("Invalid dispatcher configuration: {0}")]
    InvalidConfig(String),
}

/// Launch counters shared between the loop and its handle
#[derive(Debug, Default)]
pub struct DispatchStats {
    launched: AtomicU64,
    skipped: AtomicU64,
    faults: AtomicU64,
}

impl DispatchStats {
    /// Cycles spawned
    pub fn launched(&self) -> u64 {
        self.launched.load(Ordering::Relaxed)
    }

    /// Ticks dropped because the in-flight ceiling was reached
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Cycles that panicked
    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }
}

/// Periodic probe dispatcher
pub struct Dispatcher {
    prober: Arc<Prober>,
    identities: Arc<IdentityGenerator>,
    config: DispatcherConfig,
    permits: Arc<Semaphore>,
    stats: Arc<DispatchStats>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(
        prober: Arc<Prober>,
        identities: IdentityGenerator,
        config: DispatcherConfig,
    ) -> Result<Self, DispatchError> {
        if config.interval.is_zero() {
            return Err(DispatchError::InvalidConfig(
                "interval must be greater than zero".to_string(),
            ));
        }
        if config.max_in_flight == 0 {
            return Err(DispatchError::InvalidConfig(
                "max_in_flight must be at least 1".to_string(),
            ));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            prober,
            identities: Arc::new(identities),
            permits: Arc::new(Semaphore::new(config.max_in_flight)),
            config,
            stats: Arc::new(DispatchStats::default()),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Launch counters
    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }

    /// Run a single cycle to completion
    pub async fn run_once(&self) -> Result<CycleOutcome, DispatchError> {
        let identity = self.identities.next();
        let prober = self.prober.clone();
        let cycle_identity = identity.clone();

        self.stats.launched.fetch_add(1, Ordering::Relaxed);
        let task = tokio::spawn(async move { prober.run_cycle(&cycle_identity).await });

        task.await.map_err(|err| {
            self.stats.faults.fetch_add(1, Ordering::Relaxed);
            let reason = join_error_reason(err);
            error!(identity = %identity, error = %reason, "Probe cycle faulted");
            DispatchError::CycleFault {
                identity: identity.to_string(),
                reason,
            }
        })
    }

    /// Start the continuous loop in a background task
    pub fn start(self) -> DispatcherHandle {
        let shutdown_tx = self.shutdown_tx.clone();
        let stats = self.stats.clone();
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            self.run_loop().await;
        });

        DispatcherHandle {
            shutdown_tx,
            task_handle: handle,
            stats,
            config,
        }
    }

    async fn run_loop(self) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut cycles: JoinSet<(ProbeIdentity, CycleOutcome)> = JoinSet::new();

        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            max_in_flight = self.config.max_in_flight,
            "Probe dispatcher started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.launch(&mut cycles);
                }
                Some(result) = cycles.join_next(), if !cycles.is_empty() => {
                    self.reap(result);
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!(in_flight = cycles.len(), "Probe dispatcher shutting down");
                        break;
                    }
                }
            }
        }

        if self.config.drain_on_shutdown {
            while let Some(result) = cycles.join_next().await {
                self.reap(result);
            }
        } else {
            cycles.shutdown().await;
        }
    }

    fn launch(&self, cycles: &mut JoinSet<(ProbeIdentity, CycleOutcome)>) {
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    max_in_flight = self.config.max_in_flight,
                    "Skipping probe tick: too many cycles in flight"
                );
                return;
            }
        };

        let identity = self.identities.next();
        let prober = self.prober.clone();
        debug!(identity = %identity, "Launching probe cycle");
        self.stats.launched.fetch_add(1, Ordering::Relaxed);

        cycles.spawn(async move {
            let _permit = permit;
            let outcome = prober.run_cycle(&identity).await;
            (identity, outcome)
        });
    }

    fn reap(&self, result: Result<(ProbeIdentity, CycleOutcome), JoinError>) {
        match result {
            Ok((identity, outcome)) => {
                debug!(identity = %identity, outcome = %outcome, "Probe cycle reaped");
            }
            Err(err) if err.is_cancelled() => {
                debug!("Probe cycle cancelled");
            }
            Err(err) => {
                self.stats.faults.fetch_add(1, Ordering::Relaxed);
                error!(error = %join_error_reason(err), "Probe cycle faulted");
            }
        }
    }
}

fn join_error_reason(err: JoinError) -> String {
    if err.is_panic() {
        panic_message(err.into_panic())
    } else {
        err.to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

/// Handle for controlling a running dispatcher
pub struct DispatcherHandle {
    shutdown_tx: watch::Sender<bool>,
    task_handle: tokio::task::JoinHandle<()>,
    stats: Arc<DispatchStats>,
    config: DispatcherConfig,
}

impl DispatcherHandle {
    /// Stop the dispatcher, draining or aborting in-flight cycles
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task_handle.await;
        info!(
            launched = self.stats.launched(),
            skipped = self.stats.skipped(),
            faults = self.stats.faults(),
            "Probe dispatcher stopped"
        );
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        !self.task_handle.is_finished()
    }

    /// Launch counters
    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }

    /// Get the configuration
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }
}

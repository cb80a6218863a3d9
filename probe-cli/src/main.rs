//! S3 Prober Entry Point
//!
//! Configuration is loaded from environment variables (via .env file).
//! There are no command-line arguments.
//!
//! Exit codes:
//!   0 - clean shutdown, or a completed single-shot cycle whatever its outcome
//!   1 - configuration or startup failure
//!
//! Probe failures are reported only through metrics and logs.

use probe_core::telemetry::{init_logging, install_exporter};
use probe_core::{
    CycleOutcome, Dispatcher, MetricsExporterConfig, ProbeConfig, ProbeResult, ProbeStatus,
    Prober, RecorderMetrics, RunMode,
};
use probe_storage::S3ObjectStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Slack on top of one push interval before a single-shot run exits
const PUSH_FLUSH_MARGIN: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not found)
    dotenvy::dotenv().ok();

    if let Err(e) = run().await {
        error!(error = %e, "Prober failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> ProbeResult<()> {
    let config = ProbeConfig::from_env()?;
    init_logging(&config.log_config())?;
    config.validate()?;

    info!(
        bucket = %config.bucket,
        endpoint = config.endpoint_url.as_deref().unwrap_or("default"),
        run_mode = config.run_mode.as_str(),
        interval_secs = config.interval.as_secs(),
        "Starting S3 prober"
    );

    let store = S3ObjectStore::new(config.s3_config()).await?;
    let status = Arc::new(ProbeStatus::new());
    let exporter = config.exporter_config();
    install_exporter(&exporter, status.clone()).await?;

    let prober = Prober::new(
        Arc::new(store),
        Arc::new(RecorderMetrics),
        config.probe_settings(),
    )
    .with_status(status);
    let dispatcher = Dispatcher::new(
        Arc::new(prober),
        config.identity_generator()?,
        config.dispatcher_config(),
    )?;

    match config.run_mode {
        RunMode::Once => {
            run_single_shot(&dispatcher, &exporter).await?;
        }
        RunMode::Continuous => {
            let handle = dispatcher.start();
            shutdown_signal().await;
            info!("Shutdown signal received");
            handle.stop().await;
        }
    }

    Ok(())
}

/// Run one cycle, then hold the process long enough for a push to land
///
/// A failed cycle is still a completed run; only a crashed cycle task is
/// an error here.
async fn run_single_shot(
    dispatcher: &Dispatcher,
    exporter: &MetricsExporterConfig,
) -> ProbeResult<CycleOutcome> {
    let outcome = dispatcher.run_once().await?;
    info!(outcome = %outcome, "Single-shot probe finished");

    if let Some(delay) = push_flush_delay(exporter) {
        debug!(delay_secs = delay.as_secs_f64(), "Waiting for metrics push");
        tokio::time::sleep(delay).await;
    }

    Ok(outcome)
}

/// How long a single-shot run waits before exiting
fn push_flush_delay(exporter: &MetricsExporterConfig) -> Option<Duration> {
    match exporter {
        MetricsExporterConfig::Push { interval, .. } => Some(*interval + PUSH_FLUSH_MARGIN),
        MetricsExporterConfig::Pull { .. } | MetricsExporterConfig::Disabled => None,
    }
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

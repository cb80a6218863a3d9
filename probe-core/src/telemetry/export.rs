//! Metrics Exposition
//!
//! Pull mode installs a Prometheus recorder and serves it next to a health
//! endpoint. Push mode hands the recorder to the exporter's push-gateway
//! task. Disabled mode installs nothing, so the `metrics` macros are no-ops.

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::metrics::{describe_metrics, LATENCY_BUCKETS, LATENCY_HISTOGRAM};
use super::TelemetryError;
use crate::cycle::{CycleOutcome, ProbeStatus};

/// How often the pull recorder drains histogram buffers
const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Exposition mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum MetricsExporterConfig {
    /// Serve `/metrics` and `/health` over HTTP
    Pull { bind: IpAddr, port: u16 },
    /// Push to a Prometheus push gateway
    Push { gateway_url: String, interval: Duration },
    /// No exporter
    Disabled,
}

impl Default for MetricsExporterConfig {
    fn default() -> Self {
        Self::Pull {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8000,
        }
    }
}

impl MetricsExporterConfig {
    /// Mode name used in configuration
    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::Pull { .. } => "pull",
            Self::Push { .. } => "push",
            Self::Disabled => "disabled",
        }
    }
}

/// Builder with the probe's latency buckets applied
pub fn prometheus_builder() -> Result<PrometheusBuilder, TelemetryError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(LATENCY_HISTOGRAM.to_string()), LATENCY_BUCKETS)
        .map_err(|e| TelemetryError::Exporter(e.to_string()))
}

/// Install the global recorder for `config`
///
/// Returns the bound address in pull mode. Must run inside a Tokio runtime.
pub async fn install_exporter(
    config: &MetricsExporterConfig,
    status: Arc<ProbeStatus>,
) -> Result<Option<SocketAddr>, TelemetryError> {
    match config {
        MetricsExporterConfig::Pull { bind, port } => {
            let handle = prometheus_builder()?
                .install_recorder()
                .map_err(|e| TelemetryError::Exporter(e.to_string()))?;
            describe_metrics();

            let upkeep = handle.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(UPKEEP_INTERVAL);
                loop {
                    ticker.tick().await;
                    upkeep.run_upkeep();
                }
            });

            let router = metrics_router(ExporterState::new(handle, status));
            let addr = serve_metrics(SocketAddr::new(*bind, *port), router).await?;
            info!(%addr, "Metrics endpoint listening");
            Ok(Some(addr))
        }
        MetricsExporterConfig::Push {
            gateway_url,
            interval,
        } => {
            prometheus_builder()?
                .with_push_gateway(gateway_url.as_str(), *interval, None, None)
                .map_err(|e| TelemetryError::Exporter(e.to_string()))?
                .install()
                .map_err(|e| TelemetryError::Exporter(e.to_string()))?;
            describe_metrics();
            info!(gateway = %gateway_url, interval_secs = interval.as_secs(), "Pushing metrics");
            Ok(None)
        }
        MetricsExporterConfig::Disabled => {
            info!("Metrics disabled");
            Ok(None)
        }
    }
}

/// Shared state of the metrics router
#[derive(Clone)]
pub struct ExporterState {
    handle: PrometheusHandle,
    status: Arc<ProbeStatus>,
    started_at: Instant,
}

impl ExporterState {
    pub fn new(handle: PrometheusHandle, status: Arc<ProbeStatus>) -> Self {
        Self {
            handle,
            status,
            started_at: Instant::now(),
        }
    }
}

/// Health endpoint body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` until a cycle fails, `degraded` while the last one failed
    pub status: String,
    pub version: String,
    pub last_outcome: Option<CycleOutcome>,
    pub last_finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub cycles_completed: u64,
    pub uptime_secs: u64,
}

/// Router serving `GET /metrics` and `GET /health`
pub fn metrics_router(state: ExporterState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn metrics_handler(State(state): State<ExporterState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.handle.render(),
    )
}

async fn health_handler(State(state): State<ExporterState>) -> Json<HealthResponse> {
    let last = state.status.last();
    let status = match last {
        Some(cycle) if !cycle.outcome.is_success() => "degraded",
        _ => "healthy",
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        last_outcome: last.map(|c| c.outcome),
        last_finished_at: last.map(|c| c.finished_at),
        cycles_completed: state.status.completed(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// Bind `addr` and serve `router` in the background
///
/// Returns the bound address (useful when port is 0).
pub async fn serve_metrics(addr: SocketAddr, router: Router) -> Result<SocketAddr, TelemetryError> {
    let bind_error = |e: std::io::Error| TelemetryError::Bind {
        addr: addr.to_string(),
        reason: e.to_string(),
    };
    let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
    let actual_addr = listener.local_addr().map_err(bind_error)?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(actual_addr)
}

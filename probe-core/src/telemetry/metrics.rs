//! Probe Metrics
//!
//! # Metrics
//!
//! - `s3_object_availability` (gauge) - 1 if the last completed comparison
//!   matched, 0 if the read or comparison failed
//! - `s3_errors_total{error}` (counter) - failures by reason
//! - `s3_latency{method}` (histogram) - successful store call
//!   latency by operation (`put`, `get`, `delete`)
//!
//! Cycles report through the [`MetricsSink`] trait. Production wiring uses
//! [`RecorderMetrics`], which forwards to the `metrics` facade and whatever
//! exporter is installed; tests use [`InMemoryMetrics`].

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use probe_storage::StoreOperation;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Availability gauge name
pub const AVAILABILITY_GAUGE: &str = "s3_object_availability";
/// Error counter name
pub const ERRORS_COUNTER: &str = "s3_errors_total";
/// Latency histogram name
pub const LATENCY_HISTOGRAM: &str = "s3_latency";
/// Histogram buckets for store latency, in seconds
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Sink for the signals produced by a probe cycle
///
/// Implementations must be safe to share between concurrently running
/// cycles; every call is a single atomic update.
pub trait MetricsSink: Send + Sync {
    /// Set the availability gauge
    fn set_availability(&self, available: bool);

    /// Count one failure under `reason`
    fn record_error(&self, reason: &str);

    /// Record a successful store call's duration
    fn observe_latency(&self, operation: StoreOperation, elapsed: Duration);
}

/// Register metric descriptions with the installed recorder
pub fn describe_metrics() {
    describe_gauge!(AVAILABILITY_GAUGE, "S3 object availability");
    describe_counter!(ERRORS_COUNTER, "S3 errors");
    describe_histogram!(LATENCY_HISTOGRAM, Unit::Seconds, "S3 latency");
}

/// Sink backed by the global `metrics` recorder
#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderMetrics;

impl MetricsSink for RecorderMetrics {
    fn set_availability(&self, available: bool) {
        gauge!(AVAILABILITY_GAUGE).set(if available { 1.0 } else { 0.0 });
    }

    fn record_error(&self, reason: &str) {
        counter!(ERRORS_COUNTER, "error" => reason.to_string()).increment(1);
    }

    fn observe_latency(&self, operation: StoreOperation, elapsed: Duration) {
        histogram!(LATENCY_HISTOGRAM, "method" => operation.as_str()).record(elapsed.as_secs_f64());
    }
}

/// Point-in-time copy of [`InMemoryMetrics`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Gauge value, `None` until first set
    pub availability: Option<i64>,
    /// Error counts by reason
    pub errors: BTreeMap<String, u64>,
    /// Latency sample counts by operation label
    pub latency_samples: BTreeMap<String, u64>,
}

/// In-process sink with inspectable state
#[derive(Debug)]
pub struct InMemoryMetrics {
    availability: AtomicI64,
    errors: Mutex<BTreeMap<String, u64>>,
    latencies: Mutex<HashMap<StoreOperation, Vec<f64>>>,
}

const UNSET: i64 = -1;

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self {
            availability: AtomicI64::new(UNSET),
            errors: Mutex::new(BTreeMap::new()),
            latencies: Mutex::new(HashMap::new()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current gauge value
    pub fn availability(&self) -> Option<i64> {
        match self.availability.load(Ordering::SeqCst) {
            UNSET => None,
            value => Some(value),
        }
    }

    /// Count for one error reason
    pub fn error_count(&self, reason: &str) -> u64 {
        lock(&self.errors).get(reason).copied().unwrap_or(0)
    }

    /// Sum of all error counts
    pub fn total_errors(&self) -> u64 {
        lock(&self.errors).values().sum()
    }

    /// Number of latency samples for one operation
    pub fn latency_count(&self, operation: StoreOperation) -> usize {
        lock(&self.latencies).get(&operation).map_or(0, Vec::len)
    }

    /// Latency samples (seconds) for one operation
    pub fn latency_samples(&self, operation: StoreOperation) -> Vec<f64> {
        lock(&self.latencies)
            .get(&operation)
            .cloned()
            .unwrap_or_default()
    }

    /// Copy the current state
    pub fn snapshot(&self) -> MetricsSnapshot {
        let latencies = lock(&self.latencies);
        MetricsSnapshot {
            availability: self.availability(),
            errors: lock(&self.errors).clone(),
            latency_samples: StoreOperation::ALL
                .iter()
                .filter_map(|op| {
                    latencies
                        .get(op)
                        .map(|samples| (op.as_str().to_string(), samples.len() as u64))
                })
                .collect(),
        }
    }

    /// Export in Prometheus text exposition format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("# HELP {} S3 object availability\n", AVAILABILITY_GAUGE));
        output.push_str(&format!("# TYPE {} gauge\n", AVAILABILITY_GAUGE));
        if let Some(value) = self.availability() {
            output.push_str(&format!("{} {}\n", AVAILABILITY_GAUGE, value));
        }

        output.push_str(&format!("# HELP {} S3 errors\n", ERRORS_COUNTER));
        output.push_str(&format!("# TYPE {} counter\n", ERRORS_COUNTER));
        for (reason, count) in lock(&self.errors).iter() {
            output.push_str(&format!(
                "{}{{error=\"{}\"}} {}\n",
                ERRORS_COUNTER,
                escape_label(reason),
                count
            ));
        }

        output.push_str(&format!("# HELP {} S3 latency\n", LATENCY_HISTOGRAM));
        output.push_str(&format!("# TYPE {} histogram\n", LATENCY_HISTOGRAM));
        let latencies = lock(&self.latencies);
        for op in StoreOperation::ALL {
            let Some(samples) = latencies.get(&op) else {
                continue;
            };
            let method = op.as_str();
            for bucket in LATENCY_BUCKETS {
                let count = samples.iter().filter(|s| **s <= *bucket).count();
                output.push_str(&format!(
                    "{}_bucket{{method=\"{}\",le=\"{}\"}} {}\n",
                    LATENCY_HISTOGRAM, method, bucket, count
                ));
            }
            output.push_str(&format!(
                "{}_bucket{{method=\"{}\",le=\"+Inf\"}} {}\n",
                LATENCY_HISTOGRAM,
                method,
                samples.len()
            ));
            output.push_str(&format!(
                "{}_sum{{method=\"{}\"}} {}\n",
                LATENCY_HISTOGRAM,
                method,
                samples.iter().sum::<f64>()
            ));
            output.push_str(&format!(
                "{}_count{{method=\"{}\"}} {}\n",
                LATENCY_HISTOGRAM,
                method,
                samples.len()
            ));
        }

        output
    }
}

impl MetricsSink for InMemoryMetrics {
    fn set_availability(&self, available: bool) {
        self.availability
            .store(i64::from(available), Ordering::SeqCst);
    }

    fn record_error(&self, reason: &str) {
        *lock(&self.errors).entry(reason.to_string()).or_insert(0) += 1;
    }

    fn observe_latency(&self, operation: StoreOperation, elapsed: Duration) {
        lock(&self.latencies)
            .entry(operation)
            .or_default()
            .push(elapsed.as_secs_f64());
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

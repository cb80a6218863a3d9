//! Integration tests for full probe cycles
//!
//! These drive the prober end to end against the in-memory store and check
//! the metric projection of every outcome.

use probe_core::{
    CycleOutcome, IdentityGenerator, InMemoryMetrics, ProbeIdentity, ProbeSettings, Prober,
    COMPARISON_FAILED,
};
use probe_storage::{FaultMode, MemoryObjectStore, StoreError, StoreOperation};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const BUCKET: &str = "probe-bucket";

struct Harness {
    _dir: TempDir,
    staging_dir: PathBuf,
    store: Arc<MemoryObjectStore>,
    metrics: Arc<InMemoryMetrics>,
    prober: Arc<Prober>,
}

fn harness_with(payload: &[u8], cleanup_on_mismatch: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let reference = dir.path().join("original.jpg");
    std::fs::write(&reference, payload).unwrap();
    let staging_dir = dir.path().join("staging");
    std::fs::create_dir(&staging_dir).unwrap();

    let store = Arc::new(MemoryObjectStore::new());
    let metrics = Arc::new(InMemoryMetrics::new());
    let settings = ProbeSettings::new(BUCKET, reference)
        .with_staging_dir(&staging_dir)
        .with_settle_delay(Duration::ZERO)
        .with_cleanup_on_mismatch(cleanup_on_mismatch);
    let prober = Arc::new(Prober::new(store.clone(), metrics.clone(), settings));

    Harness {
        _dir: dir,
        staging_dir,
        store,
        metrics,
        prober,
    }
}

fn harness(payload: &[u8]) -> Harness {
    harness_with(payload, true)
}

fn id(name: &str) -> ProbeIdentity {
    ProbeIdentity::parse(name).unwrap()
}

fn staging_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect()
}

// ============ Reference Scenarios ============

#[tokio::test]
async fn test_successful_round_trip() {
    let h = harness(b"0123456789");

    let outcome = h.prober.run_cycle(&id("test-1700000000.jpg")).await;

    assert_eq!(outcome, CycleOutcome::Success);
    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.availability, Some(1));
    assert!(snapshot.errors.is_empty());
    assert_eq!(snapshot.latency_samples.get("put"), Some(&1));
    assert_eq!(snapshot.latency_samples.get("get"), Some(&1));
    assert_eq!(snapshot.latency_samples.get("delete"), Some(&1));

    let keys: Vec<_> = h.store.calls().into_iter().map(|c| c.key).collect();
    assert_eq!(keys, vec!["test-1700000000.jpg"; 3]);
    assert!(staging_files(&h.staging_dir).is_empty());
}

#[tokio::test]
async fn test_read_failure_connection_reset() {
    let h = harness(b"0123456789");
    h.store
        .fail_next(StoreOperation::Get, StoreError::transport("connection reset"));

    let outcome = h.prober.run_cycle(&id("test-1700000001.jpg")).await;

    assert_eq!(outcome, CycleOutcome::ReadFailed);
    assert_eq!(h.metrics.availability(), Some(0));
    assert_eq!(h.metrics.error_count("connection reset"), 1);
    assert_eq!(h.metrics.latency_count(StoreOperation::Get), 0);
    assert_eq!(h.store.call_count(StoreOperation::Delete), 0);

    let exposition = h.metrics.export_prometheus();
    assert!(exposition.contains("s3_errors_total{error=\"connection reset\"} 1"));
    assert!(exposition.contains("s3_object_availability 0"));
}

// ============ Failure Paths ============

#[tokio::test]
async fn test_write_failure_touches_nothing_else() {
    let h = harness(b"0123456789");
    h.store.fail_next(
        StoreOperation::Put,
        StoreError::service(Some("SlowDown"), Some("Please reduce your request rate.")),
    );

    let outcome = h.prober.run_cycle(&id("test-1700000002.jpg")).await;

    assert_eq!(outcome, CycleOutcome::WriteFailed);
    assert_eq!(h.metrics.availability(), None);
    assert_eq!(h.metrics.error_count("Please reduce your request rate."), 1);
    assert_eq!(h.store.call_count(StoreOperation::Get), 0);
    assert_eq!(h.store.call_count(StoreOperation::Delete), 0);
    assert!(staging_files(&h.staging_dir).is_empty());
}

#[tokio::test]
async fn test_service_error_without_message_uses_code() {
    let h = harness(b"0123456789");
    h.store
        .fail_next(StoreOperation::Put, StoreError::service(Some("AccessDenied"), None));

    h.prober.run_cycle(&id("test-1700000003.jpg")).await;

    assert_eq!(h.metrics.error_count("AccessDenied"), 1);
}

#[tokio::test]
async fn test_object_vanishing_before_read() {
    let h = harness(b"0123456789");
    h.store.discard_writes(true);

    let outcome = h.prober.run_cycle(&id("test-1700000004.jpg")).await;

    assert_eq!(outcome, CycleOutcome::ReadFailed);
    assert_eq!(h.metrics.error_count("The specified key does not exist."), 1);
}

#[tokio::test]
async fn test_mismatch_is_counted_and_cleaned_up() {
    let h = harness(b"0123456789");
    h.store.corrupt_reads(true);

    let outcome = h.prober.run_cycle(&id("test-1700000005.jpg")).await;

    assert_eq!(outcome, CycleOutcome::Mismatch);
    assert_eq!(h.metrics.availability(), Some(0));
    assert_eq!(h.metrics.error_count(COMPARISON_FAILED), 1);
    assert_eq!(h.store.object_count(), 0);
    assert!(staging_files(&h.staging_dir).is_empty());
}

#[tokio::test]
async fn test_mismatch_without_cleanup_keeps_object_for_inspection() {
    let h = harness_with(b"0123456789", false);
    h.store.corrupt_reads(true);

    let outcome = h.prober.run_cycle(&id("test-1700000006.jpg")).await;

    assert_eq!(outcome, CycleOutcome::Mismatch);
    assert_eq!(h.store.call_count(StoreOperation::Delete), 0);
    assert!(h.store.object(BUCKET, "test-1700000006.jpg").is_some());
}

#[tokio::test]
async fn test_delete_failure_does_not_change_outcome() {
    let h = harness(b"0123456789");
    h.store
        .fail_next(StoreOperation::Delete, StoreError::transport("dispatch failure"));

    let outcome = h.prober.run_cycle(&id("test-1700000007.jpg")).await;

    assert_eq!(outcome, CycleOutcome::Success);
    assert_eq!(h.metrics.availability(), Some(1));
    assert_eq!(h.metrics.error_count("dispatch failure"), 1);
    assert_eq!(h.metrics.latency_count(StoreOperation::Delete), 0);
}

#[tokio::test]
async fn test_recovery_flips_gauge_back() {
    let h = harness(b"0123456789");
    h.store.fail_always(StoreOperation::Get, StoreError::transport("timeout"));

    h.prober.run_cycle(&id("test-1700000010.jpg")).await;
    h.prober.run_cycle(&id("test-1700000020.jpg")).await;
    assert_eq!(h.metrics.availability(), Some(0));
    assert_eq!(h.metrics.error_count("timeout"), 2);

    h.store.clear_faults();
    let outcome = h.prober.run_cycle(&id("test-1700000030.jpg")).await;

    assert_eq!(outcome, CycleOutcome::Success);
    assert_eq!(h.metrics.availability(), Some(1));
    // Objects from the failed reads were never deleted
    assert_eq!(h.store.object_count(), 2);
}

// ============ Concurrency ============

#[tokio::test]
async fn test_concurrent_same_second_cycles_do_not_collide() {
    let h = harness(b"0123456789");
    let generator = IdentityGenerator::new("test", "jpg").unwrap();
    let identities: Vec<_> = (0..8).map(|_| generator.next_at(1_700_000_000)).collect();

    let names: HashSet<_> = identities.iter().map(|i| i.as_str().to_string()).collect();
    let staging: HashSet<_> = identities.iter().map(|i| i.staging_file_name()).collect();
    assert_eq!(names.len(), 8);
    assert_eq!(staging.len(), 8);

    let tasks: Vec<_> = identities
        .into_iter()
        .map(|identity| {
            let prober = h.prober.clone();
            tokio::spawn(async move { prober.run_cycle(&identity).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), CycleOutcome::Success);
    }

    assert_eq!(h.metrics.total_errors(), 0);
    assert_eq!(h.metrics.latency_count(StoreOperation::Put), 8);
    assert_eq!(h.store.object_count(), 0);
    assert!(staging_files(&h.staging_dir).is_empty());
}

#[tokio::test]
async fn test_persistent_fault_mode_counts_every_cycle() {
    let h = harness(b"0123456789");
    h.store.inject(StoreOperation::Put, StoreError::transport("no route to host"), FaultMode::Always);

    for secs in 0..3 {
        let identity = id(&format!("test-{}.jpg", 1_700_000_100 + secs * 10));
        assert_eq!(h.prober.run_cycle(&identity).await, CycleOutcome::WriteFailed);
    }

    assert_eq!(h.metrics.error_count("no route to host"), 3);
}

//! S3 store tests that need no live endpoint

use probe_storage::{ObjectStore, PutOptions, S3Config, S3ObjectStore, StoreError};
use tempfile::TempDir;

#[tokio::test]
async fn test_rejects_empty_credentials() {
    let result = S3ObjectStore::new(S3Config::aws("us-east-1", "", "")).await;
    assert!(matches!(result, Err(StoreError::Configuration(_))));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("original.jpg");
    std::fs::write(&source, b"0123456789").unwrap();

    // Port 1 on loopback refuses connections
    let config = S3Config::aws("us-east-1", "AKIDEXAMPLE", "secret")
        .with_endpoint("http://127.0.0.1:1")
        .with_path_style(true);
    let store = S3ObjectStore::new(config).await.unwrap();
    assert_eq!(store.backend_name(), "s3");

    let err = store
        .put("probe-bucket", "test-1700000000.jpg", &source, &PutOptions::default())
        .await
        .unwrap_err();

    match err {
        StoreError::Transport(message) => assert!(!message.is_empty()),
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_source_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let config = S3Config::aws("us-east-1", "AKIDEXAMPLE", "secret")
        .with_endpoint("http://127.0.0.1:1");
    let store = S3ObjectStore::new(config).await.unwrap();

    let err = store
        .put("probe-bucket", "key", &dir.path().join("missing.jpg"), &PutOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Io(_)));
}

//! Probe Object Storage
//!
//! Object store clients driven by the availability prober.
//!
//! # Backends
//!
//! - **S3-compatible**: AWS S3, MinIO, Ceph RGW and friends via `aws-sdk-s3`
//! - **Memory**: in-process store with fault injection, for tests and dry runs
//!
//! # Usage
//!
//! ```ignore
//! use probe_storage::{ObjectStore, PutOptions, S3Config, S3ObjectStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = S3Config::aws("us-east-1", "AKIA...", "secret")
//!         .with_endpoint("http://localhost:9000")
//!         .with_path_style(true);
//!     let store = S3ObjectStore::new(config).await?;
//!
//!     let source = std::path::Path::new("original.jpg");
//!     store.put("probe-bucket", "test-1700000000.jpg", source, &PutOptions::default()).await?;
//!     store.get("probe-bucket", "test-1700000000.jpg", "output-1700000000.jpg".as_ref()).await?;
//!     store.delete("probe-bucket", "test-1700000000.jpg").await?;
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod memory;
pub mod s3;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{FaultMode, MemoryObjectStore, StoreCall, StoredObject};
pub use s3::{S3Config, S3ObjectStore};
pub use traits::{ObjectStore, PutOptions, StoreOperation};

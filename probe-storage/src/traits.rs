//! Object Store Traits
//!
//! Defines the narrow put/get/delete interface the prober drives.
//! Backends are replaceable - S3-compatible services in production,
//! an in-memory store for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::StoreResult;

/// Object Store Trait
///
/// Every call targets exactly one named object in one bucket. Objects are
/// exchanged through local files so large payloads never sit in memory.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the contents of `source` under `key`
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        options: &PutOptions,
    ) -> StoreResult<()>;

    /// Download `key` into `destination`, replacing any existing file
    async fn get(&self, bucket: &str, key: &str, destination: &Path) -> StoreResult<()>;

    /// Remove `key` from the bucket
    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// Short backend identifier for logs
    fn backend_name(&self) -> &'static str;
}

/// Options applied to uploads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutOptions {
    /// Canned ACL (e.g. `public-read`)
    pub acl: String,
    /// Content type stored with the object
    pub content_type: String,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            acl: "public-read".to_string(),
            content_type: "image/jpeg".to_string(),
        }
    }
}

impl PutOptions {
    /// Create options with an explicit ACL and content type
    pub fn new(acl: &str, content_type: &str) -> Self {
        Self {
            acl: acl.to_string(),
            content_type: content_type.to_string(),
        }
    }
}

/// Kind of store operation, used as the latency label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreOperation {
    Put,
    Get,
    Delete,
}

impl StoreOperation {
    /// All operations, in cycle order
    pub const ALL: [StoreOperation; 3] = [Self::Put, Self::Get, Self::Delete];

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Put => "put",
            Self::Get => "get",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

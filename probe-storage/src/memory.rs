//! In-Memory Object Store
//!
//! Keeps objects in process memory. Supports fault injection per operation
//! and read corruption so probe behaviour can be exercised without a live
//! bucket.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{ObjectStore, PutOptions, StoreOperation};

/// How long an injected fault stays armed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    /// Fire on the next matching call, then disarm
    Once,
    /// Fire on every matching call until cleared
    Always,
}

#[derive(Debug, Clone)]
struct ArmedFault {
    error: StoreError,
    mode: FaultMode,
}

/// A recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub operation: StoreOperation,
    pub bucket: String,
    pub key: String,
}

/// Stored object with the options it was uploaded with
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub options: PutOptions,
}

#[derive(Default)]
struct MemoryState {
    objects: HashMap<(String, String), StoredObject>,
    faults: HashMap<StoreOperation, ArmedFault>,
    calls: Vec<StoreCall>,
    corrupt_reads: bool,
    discard_writes: bool,
    latency: Option<Duration>,
}

/// In-memory object store
#[derive(Default)]
pub struct MemoryObjectStore {
    state: Mutex<MemoryState>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail the next `operation` with `error`
    pub fn fail_next(&self, operation: StoreOperation, error: StoreError) {
        self.inject(operation, error, FaultMode::Once);
    }

    /// Fail every `operation` with `error` until cleared
    pub fn fail_always(&self, operation: StoreOperation, error: StoreError) {
        self.inject(operation, error, FaultMode::Always);
    }

    /// Arm a fault for `operation`, replacing any previous one
    pub fn inject(&self, operation: StoreOperation, error: StoreError, mode: FaultMode) {
        self.state()
            .faults
            .insert(operation, ArmedFault { error, mode });
    }

    /// Disarm all injected faults
    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    /// Flip a byte in every downloaded copy
    pub fn corrupt_reads(&self, enabled: bool) {
        self.state().corrupt_reads = enabled;
    }

    /// Acknowledge puts without storing them
    pub fn discard_writes(&self, enabled: bool) {
        self.state().discard_writes = enabled;
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().latency = latency;
    }

    /// Calls received so far, in order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    /// Number of calls of one kind
    pub fn call_count(&self, operation: StoreOperation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Get a stored object
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.state()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of objects across all buckets
    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }

    /// Record the call and return the armed fault (if any) plus the delay to apply
    fn begin(
        &self,
        operation: StoreOperation,
        bucket: &str,
        key: &str,
    ) -> (Option<StoreError>, Option<Duration>) {
        let mut state = self.state();
        state.calls.push(StoreCall {
            operation,
            bucket: bucket.to_string(),
            key: key.to_string(),
        });

        let mode = state.faults.get(&operation).map(|armed| armed.mode);
        let fault = match mode {
            Some(FaultMode::Once) => state.faults.remove(&operation).map(|armed| armed.error),
            Some(FaultMode::Always) => state
                .faults
                .get(&operation)
                .map(|armed| armed.error.clone()),
            None => None,
        };

        (fault, state.latency)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        options: &PutOptions,
    ) -> StoreResult<()> {
        let (fault, latency) = self.begin(StoreOperation::Put, bucket, key);
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = fault {
            return Err(err);
        }

        let data = tokio::fs::read(source).await?;
        debug!(bucket, key, bytes = data.len(), "memory PUT");

        let mut state = self.state();
        if !state.discard_writes {
            state.objects.insert(
                (bucket.to_string(), key.to_string()),
                StoredObject {
                    data,
                    options: options.clone(),
                },
            );
        }
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str, destination: &Path) -> StoreResult<()> {
        let (fault, latency) = self.begin(StoreOperation::Get, bucket, key);
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = fault {
            return Err(err);
        }

        let (mut data, corrupt) = {
            let state = self.state();
            let object = state
                .objects
                .get(&(bucket.to_string(), key.to_string()))
                .ok_or_else(|| {
                    StoreError::service(Some("NoSuchKey"), Some("The specified key does not exist."))
                })?;
            (object.data.clone(), state.corrupt_reads)
        };

        if corrupt {
            match data.first_mut() {
                Some(byte) => *byte ^= 0xFF,
                None => data.push(0),
            }
        }

        tokio::fs::write(destination, &data).await?;
        debug!(bucket, key, bytes = data.len(), "memory GET");
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let (fault, latency) = self.begin(StoreOperation::Delete, bucket, key);
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = fault {
            return Err(err);
        }

        // S3 semantics: deleting a missing key succeeds
        self.state()
            .objects
            .remove(&(bucket.to_string(), key.to_string()));
        debug!(bucket, key, "memory DELETE");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

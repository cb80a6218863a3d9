//! S3-Compatible Object Store
//!
//! Object store client for AWS S3, MinIO and other S3-compatible services,
//! built on `aws-sdk-s3`. Credentials are always explicit; ambient profiles
//! and instance metadata are never consulted.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ObjectStore, PutOptions};

/// S3 client configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// Endpoint URL override (MinIO, Ceph, non-default regions)
    pub endpoint: Option<String>,
    /// Signing region
    pub region: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Use path-style addressing (required for most S3-compatible services)
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            force_path_style: false,
        }
    }
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

impl S3Config {
    /// Create config for AWS S3
    pub fn aws(region: &str, access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            region: region.to_string(),
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            ..Default::default()
        }
    }

    /// Point the client at a custom endpoint
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    /// Enable path-style addressing
    pub fn with_path_style(mut self, enabled: bool) -> Self {
        self.force_path_style = enabled;
        self
    }
}

/// S3 Object Store
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Build a client from configuration
    pub async fn new(config: S3Config) -> StoreResult<Self> {
        if config.access_key_id.is_empty() || config.secret_access_key.is_empty() {
            return Err(StoreError::Configuration(
                "S3 credentials must not be empty".to_string(),
            ));
        }

        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "probe-config",
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        info!(
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("default"),
            path_style = config.force_path_style,
            "S3 object store initialized"
        );

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }

    /// Wrap an already configured SDK client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        options: &PutOptions,
    ) -> StoreResult<()> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| StoreError::Io(root_cause(&e)))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .acl(ObjectCannedAcl::from(options.acl.as_str()))
            .content_type(&options.content_type)
            .body(body)
            .send()
            .await
            .map_err(map_sdk_error)?;

        debug!(bucket, key, "S3 PUT completed");
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str, destination: &Path) -> StoreResult<()> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(map_sdk_error)?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::transport(root_cause(&e)))?
            .into_bytes();

        tokio::fs::write(destination, &data).await?;

        debug!(bucket, key, bytes = data.len(), "S3 GET completed");
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(map_sdk_error)?;

        debug!(bucket, key, "S3 DELETE completed");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

/// Map an SDK error onto a label-safe `StoreError`
fn map_sdk_error<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + StdError + 'static,
    R: std::fmt::Debug + 'static,
{
    match err.as_service_error() {
        Some(service) => StoreError::service(service.code(), service.message()),
        None => StoreError::transport(root_cause(&err)),
    }
}

/// Innermost message of an error chain
///
/// SDK wrappers only say "dispatch failure"; the useful part
/// ("connection reset", "dns error") lives at the bottom of the chain.
fn root_cause(err: &(dyn StdError + 'static)) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}

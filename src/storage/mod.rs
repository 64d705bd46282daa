//! Object storage for backup artifacts.
//!
//! The uploader and the retention sweeper talk to storage through the
//! [`ObjectStore`] trait; the production backend is S3-compatible via the
//! AWS SDK, and tests substitute an in-memory store.
//!
//! The client is stateless apart from its connection pool and is shared
//! across all concurrent upload tasks.

#[cfg(test)]
pub mod memory;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::config::S3StorageConfig;

/// Errors from object storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to upload {key}: {message}")]
    Put { key: String, message: String },

    #[error("failed to list bucket: {0}")]
    List(String),

    #[error("failed to delete {key}: {message}")]
    Delete { key: String, message: String },
}

/// One object as reported by the store listing.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a bucket listing.
///
/// `next_token` is `Some` while further pages remain; callers must keep
/// paging until it is `None`.
#[derive(Debug)]
pub struct ObjectPage {
    pub objects: Vec<StoredObject>,
    pub next_token: Option<String>,
}

/// Trait for the object storage operations the pipeline needs.
///
/// Implementations must be `Send + Sync` so one client can be shared
/// across concurrent tasks.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store the file at `path` under `key`, streaming its contents.
    async fn put_file(&self, key: &str, path: &Path) -> Result<(), StorageError>;

    /// Fetch one page of the bucket's object listing.
    async fn list_page(&self, token: Option<String>) -> Result<ObjectPage, StorageError>;

    /// Delete one object.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// S3-compatible object store.
///
/// Supports AWS S3, MinIO, R2 and other S3-compatible services via a
/// custom endpoint and path-style addressing.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn new(config: &S3StorageConfig) -> Self {
        info!(bucket = %config.bucket, "initializing S3 object store");

        let mut sdk_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = &config.region {
            sdk_config_builder = sdk_config_builder.region(aws_config::Region::new(region.clone()));
        }

        // Credentials from config override the environment/IAM chain.
        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = aws_credential_types::Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None, // session token
                None, // expiry
                "forgevault-config",
            );
            sdk_config_builder = sdk_config_builder.credentials_provider(credentials);
        }

        let sdk_config = sdk_config_builder.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config_builder.build()),
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn put_file(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        let body = aws_sdk_s3::primitives::ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::Put {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Put {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list_page(&self, token: Option<String>) -> Result<ObjectPage, StorageError> {
        let mut request = self.client.list_objects_v2().bucket(&self.bucket);
        if let Some(token) = token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::List(e.to_string()))?;

        let objects = response
            .contents()
            .iter()
            .map(|object| StoredObject {
                key: object.key().unwrap_or_default().to_string(),
                size: object.size().unwrap_or(0),
                last_modified: object
                    .last_modified()
                    .and_then(|d| DateTime::from_timestamp(d.secs(), d.subsec_nanos())),
            })
            .collect();

        Ok(ObjectPage {
            objects,
            next_token: response.next_continuation_token().map(str::to_string),
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Delete {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }
}

/// Outcome of uploading one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { bytes: u64 },
    /// The artifact was zero bytes; nothing was stored. An empty mirror
    /// clone is not an error condition, just nothing worth keeping.
    SkippedEmpty,
}

/// Upload one finished artifact under `key`.
///
/// Zero-size artifacts skip the network call entirely and report success.
/// Any transport or access failure escalates to the caller; a silently
/// missing artifact would be a data-loss bug.
#[instrument(skip(store, path))]
pub async fn upload_artifact(
    store: &dyn ObjectStore,
    key: &str,
    path: &Path,
) -> Result<UploadOutcome, StorageError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| StorageError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

    if metadata.len() == 0 {
        debug!("artifact is empty, skipping upload");
        return Ok(UploadOutcome::SkippedEmpty);
    }

    store.put_file(key, path).await?;

    info!(bytes = metadata.len(), "artifact uploaded");
    Ok(UploadOutcome::Uploaded {
        bytes: metadata.len(),
    })
}

//! Object storage configuration.
//!
//! Artifacts are stored in an S3-compatible bucket. Supports AWS S3 as
//! well as MinIO, R2 and other S3-compatible services via a custom
//! endpoint.
//!
//! # Example
//!
//! ```toml
//! [storage.s3]
//! bucket = "acme-git-backups"
//! region = "eu-central-1"
//! # Credentials via env vars AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY
//! # or IAM role
//! ```

use serde::{Deserialize, Serialize};

/// Storage configuration for backup artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// S3-compatible object storage configuration.
    pub s3: S3StorageConfig,
}

impl StorageConfig {
    /// Validate the storage configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.s3.validate()
    }
}

/// S3-compatible object storage configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3StorageConfig {
    /// S3 bucket name.
    pub bucket: String,

    /// AWS region (e.g., "eu-central-1").
    /// For non-AWS S3-compatible services, use their region name.
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint URL for S3-compatible services.
    /// Examples:
    /// - MinIO: "http://localhost:9000"
    /// - R2: "https://<account-id>.r2.cloudflarestorage.com"
    #[serde(default)]
    pub endpoint: Option<String>,

    /// AWS access key ID.
    /// If not specified, uses environment variables or IAM role.
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// AWS secret access key.
    /// If not specified, uses environment variables or IAM role.
    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Use path-style URLs instead of virtual-hosted style.
    /// Required for MinIO and some S3-compatible services.
    /// Default: false (use virtual-hosted style)
    #[serde(default)]
    pub force_path_style: bool,
}

impl std::fmt::Debug for S3StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3StorageConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field(
                "access_key_id",
                &self.access_key_id.as_ref().map(|_| "****"),
            )
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "****"),
            )
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

impl S3StorageConfig {
    /// Validate S3 configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.bucket.is_empty() {
            return Err("storage.s3.bucket cannot be empty".to_string());
        }
        // Region is required unless using a custom endpoint
        if self.region.is_none() && self.endpoint.is_none() {
            return Err(
                "storage.s3 requires either 'region' or 'endpoint' to be specified".to_string(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> S3StorageConfig {
        S3StorageConfig {
            bucket: "acme-backups".to_string(),
            region: Some("eu-central-1".to_string()),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
        }
    }

    #[test]
    fn test_region_or_endpoint_required() {
        let mut config = base_config();
        config.region = None;
        assert!(config.validate().is_err());

        config.endpoint = Some("http://localhost:9000".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_masks_credentials() {
        let mut config = base_config();
        config.access_key_id = Some("AKIAEXAMPLE".to_string());
        config.secret_access_key = Some("wJalrXUtnFEMI".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("AKIAEXAMPLE"));
        assert!(!rendered.contains("wJalrXUtnFEMI"));
    }
}

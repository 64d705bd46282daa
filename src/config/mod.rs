//! Configuration module for forgevault.
//!
//! The tool is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [forge]
//! username = "backup-bot"
//! password = "${FORGE_PASSWORD}"
//! organisations = ["acme", "acme-labs"]
//!
//! [storage.s3]
//! bucket = "acme-git-backups"
//! region = "eu-central-1"
//!
//! [retention]
//! keep_last_backup_days = 7
//! ```

mod backup;
mod forge;
mod observability;
mod retention;
mod storage;

use std::path::Path;

pub use backup::*;
pub use forge::*;
pub use observability::*;
pub use retention::*;
use serde::{Deserialize, Serialize};
pub use storage::*;

/// Root configuration for forgevault.
///
/// This struct represents the complete configuration file. Only the forge
/// credentials and the storage bucket are mandatory; every other section
/// has defaults suitable for a first run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    /// Git forge credentials and the organisations to back up.
    pub forge: ForgeConfig,

    /// Object storage configuration for finished artifacts.
    pub storage: StorageConfig,

    /// Retention policy applied to stored artifacts after each run.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Local scratch space and daemon scheduling.
    #[serde(default)]
    pub backup: BackupRunConfig,

    /// Observability configuration (logging).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl BackupConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        let config: BackupConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    ///
    /// A run must never start with an empty credential or bucket value, so
    /// those are rejected here rather than surfacing as a mid-run failure.
    fn validate(&self) -> Result<(), ConfigError> {
        self.forge.validate().map_err(ConfigError::Validation)?;
        self.storage.validate().map_err(ConfigError::Validation)?;
        self.retention.validate().map_err(ConfigError::Validation)?;
        self.backup.validate().map_err(ConfigError::Validation)?;

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand environment variables in the format `${VAR_NAME}`.
///
/// Variables appearing inside TOML comments are left untouched so that a
/// commented-out example does not require the variable to be set.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let match_start = cap.get(0).unwrap().start();

            // Skip if this variable is inside a comment
            if let Some(pos) = comment_pos
                && match_start >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..match_start]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = cap.get(0).unwrap().end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [forge]
        username = "backup-bot"
        password = "hunter2"
        organisations = ["acme"]

        [storage.s3]
        bucket = "acme-backups"
        region = "eu-central-1"
    "#;

    #[test]
    fn test_minimal_config() {
        let config = BackupConfig::from_str(MINIMAL).unwrap();

        assert_eq!(config.forge.username, "backup-bot");
        assert_eq!(config.forge.organisations, vec!["acme"]);
        assert_eq!(config.storage.s3.bucket, "acme-backups");
        assert_eq!(config.retention.keep_last_backup_days, 7);
        assert_eq!(config.backup.scratch_dir, "repositories");
    }

    #[test]
    fn test_empty_password_rejected() {
        let toml = MINIMAL.replace("\"hunter2\"", "\"\"");
        let err = BackupConfig::from_str(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let toml = MINIMAL.replace("\"acme-backups\"", "\"\"");
        let err = BackupConfig::from_str(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml = format!("{MINIMAL}\n[surprise]\nvalue = 1\n");
        let err = BackupConfig::from_str(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_var_expansion() {
        temp_env::with_var("FORGEVAULT_TEST_PASSWORD", Some("s3cret"), || {
            let toml = MINIMAL.replace("\"hunter2\"", "\"${FORGEVAULT_TEST_PASSWORD}\"");
            let config = BackupConfig::from_str(&toml).unwrap();
            assert_eq!(config.forge.password, "s3cret");
        });
    }

    #[test]
    fn test_missing_env_var_errors() {
        temp_env::with_var_unset("FORGEVAULT_TEST_UNSET", || {
            let toml = MINIMAL.replace("\"hunter2\"", "\"${FORGEVAULT_TEST_UNSET}\"");
            let err = BackupConfig::from_str(&toml).unwrap_err();
            assert!(matches!(err, ConfigError::EnvVarNotFound(_)));
        });
    }

    #[test]
    fn test_env_var_in_comment_ignored() {
        let toml = format!("{MINIMAL}\n# password = \"${{FORGEVAULT_TEST_UNSET}}\"\n");
        BackupConfig::from_str(&toml).unwrap();
    }
}

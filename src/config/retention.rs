//! Artifact retention configuration.
//!
//! Controls how long finished backup artifacts survive in the bucket
//! before the retention sweeper deletes them.

use serde::{Deserialize, Serialize};

/// Retention policy for stored artifacts.
///
/// After each backup run (and on every `sweep` invocation), objects whose
/// key timestamp is older than `keep_last_backup_days` are deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Maximum age, in days, an artifact may reach before it becomes
    /// eligible for deletion.
    /// Default: 7
    #[serde(default = "default_keep_last_backup_days")]
    pub keep_last_backup_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_last_backup_days: default_keep_last_backup_days(),
        }
    }
}

fn default_keep_last_backup_days() -> u32 {
    7
}

impl RetentionConfig {
    /// Validate the retention configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.keep_last_backup_days == 0 {
            return Err(
                "retention.keep_last_backup_days must be at least 1 (a threshold of 0 would \
                 delete every backup, including the one just taken)"
                    .to_string(),
            );
        }
        Ok(())
    }
}

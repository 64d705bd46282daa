//! Backup run configuration.
//!
//! Local scratch space for mirror clones and intermediate archives, plus
//! the schedule used by daemon mode.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scratch space and scheduling for backup runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupRunConfig {
    /// Directory used for mirror clones and intermediate archives.
    /// Each run works in a `<scratch_dir>/<run timestamp>` subtree which
    /// is removed at the end of the run.
    /// Default: "repositories"
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,

    /// How often daemon mode runs a backup (in hours).
    /// Default: 24 (once per day)
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
}

impl Default for BackupRunConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            interval_hours: default_interval_hours(),
        }
    }
}

fn default_scratch_dir() -> String {
    "repositories".to_string()
}

fn default_interval_hours() -> u64 {
    24
}

impl BackupRunConfig {
    /// Interval between daemon-mode runs.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours * 3600)
    }

    /// Validate the backup run configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.scratch_dir.is_empty() {
            return Err("backup.scratch_dir cannot be empty".to_string());
        }
        if self.interval_hours == 0 {
            return Err("backup.interval_hours must be at least 1".to_string());
        }
        Ok(())
    }
}

//! Backup orchestration.
//!
//! One [`BackupEngine::run`] pass owns the whole pipeline: verify
//! credentials, then for each organisation list its repositories and fan
//! out one task per repository (clone, scrub credentials, archive,
//! upload), join them all, sweep expired artifacts, and unconditionally
//! remove the local scratch space.
//!
//! A single repository's failure is a value returned to the orchestrator,
//! never an abort: it is logged, that repository is simply missing from
//! this run's artifact set, and siblings and subsequent organisations
//! proceed. Only setup-time failures (bad credentials) end the run early.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::archive::{self, ArchiveError};
use crate::config::BackupConfig;
use crate::forge::{ForgeClient, ForgeError, RepositoryDescriptor};
use crate::git::{self, CloneError, RepositorySource};
use crate::retention::{self, SweepError, SweepSummary};
use crate::storage::{self, ObjectStore, StorageError, UploadOutcome};
use crate::timefmt;

/// Unrecoverable setup failure; the run aborts before any organisation
/// is processed.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("forge authentication failed: {0}")]
    Auth(#[source] ForgeError),
}

/// Results from one backup run.
#[derive(Debug)]
pub struct RunSummary {
    /// Run timestamp, also the artifact key prefix for this run.
    pub started_at: String,
    pub organisations: Vec<OrgSummary>,
    /// Sweep results, absent when the listing itself failed.
    pub sweep: Option<SweepSummary>,
}

impl RunSummary {
    pub fn attempted(&self) -> usize {
        self.organisations.iter().map(|o| o.attempted).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.organisations.iter().map(|o| o.succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.organisations.iter().map(|o| o.failed).sum()
    }
}

/// Per-organisation task accounting.
#[derive(Debug)]
pub struct OrgSummary {
    pub organisation: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Failure of one repository's pipeline. Logged by the orchestrator and
/// absorbed into the run summary; never propagated past the task.
#[derive(Debug, thiserror::Error)]
enum RepoBackupError {
    #[error(transparent)]
    Clone(#[from] CloneError),

    #[error("failed to scrub remote configuration: {0}")]
    Scrub(std::io::Error),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Upload(#[from] StorageError),
}

/// Owns the end-to-end backup run.
///
/// The forge and object-store clients are stateless and shared across
/// all concurrent tasks; scratch directories are never shared, each task
/// works in a subtree keyed by run timestamp, organisation and repository.
pub struct BackupEngine {
    config: Arc<BackupConfig>,
    forge: Arc<ForgeClient>,
    source: Arc<dyn RepositorySource>,
    store: Arc<dyn ObjectStore>,
}

impl BackupEngine {
    pub fn new(
        config: Arc<BackupConfig>,
        forge: Arc<ForgeClient>,
        source: Arc<dyn RepositorySource>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            forge,
            source,
            store,
        }
    }

    /// Execute one backup run end to end.
    pub async fn run(&self) -> Result<RunSummary, RunError> {
        let started_at = timefmt::render(Utc::now());

        info!(
            started_at = %started_at,
            organisations = ?self.config.forge.organisations,
            bucket = %self.config.storage.s3.bucket,
            retention_days = self.config.retention.keep_last_backup_days,
            "starting backup run"
        );

        self.forge.authenticate().await.map_err(RunError::Auth)?;

        let mut summary = RunSummary {
            started_at: started_at.clone(),
            organisations: Vec::new(),
            sweep: None,
        };

        for organisation in &self.config.forge.organisations {
            summary
                .organisations
                .push(self.backup_organisation(&started_at, organisation).await);
        }

        // All organisations have joined; only now is the bucket state
        // final enough to sweep.
        match retention::sweep(
            self.store.as_ref(),
            self.config.retention.keep_last_backup_days,
        )
        .await
        {
            Ok(sweep) => summary.sweep = Some(sweep),
            Err(SweepError::DeletionsFailed { summary: sweep }) => {
                error!(
                    failed = sweep.failed,
                    "retention sweep finished with failed deletions"
                );
                summary.sweep = Some(sweep);
            }
            Err(e) => error!(error = %e, "retention sweep failed"),
        }

        self.cleanup_scratch().await;

        info!(
            attempted = summary.attempted(),
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "backup run complete"
        );
        Ok(summary)
    }

    /// Back up every repository of one organisation, joining all tasks
    /// before returning.
    async fn backup_organisation(&self, run_timestamp: &str, organisation: &str) -> OrgSummary {
        let mut summary = OrgSummary {
            organisation: organisation.to_string(),
            attempted: 0,
            succeeded: 0,
            failed: 0,
        };

        let repos = match self.forge.list_org_repos(organisation).await {
            Ok(repos) => repos,
            Err(e) => {
                error!(
                    org = %organisation,
                    error = %e,
                    "failed to list organisation repositories, skipping organisation"
                );
                return summary;
            }
        };

        if repos.is_empty() {
            info!(org = %organisation, "organisation has no repositories");
            return summary;
        }

        summary.attempted = repos.len();
        info!(
            org = %organisation,
            repositories = repos.len(),
            "spawning backup tasks"
        );

        let scratch_org = Path::new(&self.config.backup.scratch_dir)
            .join(run_timestamp)
            .join(organisation);

        let mut tasks: JoinSet<(RepositoryDescriptor, Result<UploadOutcome, RepoBackupError>)> =
            JoinSet::new();

        for repo in repos {
            let source = Arc::clone(&self.source);
            let store = Arc::clone(&self.store);
            let key = format!("{run_timestamp}/{organisation}/{}.tar", repo.name);
            let scratch = scratch_org.clone();

            tasks.spawn(async move {
                let result =
                    backup_repository(&repo, &scratch, &key, source.as_ref(), store.as_ref()).await;
                (repo, result)
            });
        }

        // Completion barrier: every spawned task joins before the next
        // organisation starts. No task is abandoned.
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((repo, Ok(outcome))) => {
                    summary.succeeded += 1;
                    if matches!(outcome, UploadOutcome::SkippedEmpty) {
                        info!(
                            repo = %repo.full_name,
                            "repository produced an empty archive, nothing stored"
                        );
                    }
                }
                Ok((repo, Err(e))) => {
                    summary.failed += 1;
                    error!(
                        repo = %repo.full_name,
                        error = %e,
                        "repository backup failed, continuing with siblings"
                    );
                }
                Err(join_error) => {
                    summary.failed += 1;
                    error!(error = %join_error, "repository backup task panicked");
                }
            }
        }

        summary
    }

    /// Remove the scratch root, whether or not every task succeeded, so
    /// repeated runs never accumulate local disk usage. Taking the whole
    /// root also reclaims subtrees an interrupted earlier run left behind.
    async fn cleanup_scratch(&self) {
        let scratch = Path::new(&self.config.backup.scratch_dir);
        if let Err(e) = tokio::fs::remove_dir_all(scratch).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(
                path = %scratch.display(),
                error = %e,
                "failed to remove scratch directory"
            );
        }
    }
}

/// One repository's pipeline: clone, scrub credentials, archive, delete
/// the local clone, upload. Strictly sequential; each step's output is
/// the next step's required input.
async fn backup_repository(
    repo: &RepositoryDescriptor,
    scratch_org: &Path,
    key: &str,
    source: &dyn RepositorySource,
    store: &dyn ObjectStore,
) -> Result<UploadOutcome, RepoBackupError> {
    let clone_dir = scratch_org.join(&repo.name);
    source.clone_mirror(repo, &clone_dir).await?;

    git::scrub_remote_config(&clone_dir)
        .await
        .map_err(RepoBackupError::Scrub)?;

    let archive_path = scratch_org.join(format!("{}.tar", repo.name));
    archive::archive_dir(&clone_dir, &archive_path).await?;

    // The mirror is no longer needed once archived; reclaim the space
    // before the (potentially long) upload.
    if let Err(e) = tokio::fs::remove_dir_all(&clone_dir).await {
        warn!(repo = %repo.full_name, error = %e, "failed to remove local clone");
    }

    Ok(storage::upload_artifact(store, key, &archive_path).await?)
}

/// Run backups in a loop at the configured interval.
///
/// The worker runs indefinitely until the process is stopped. A failed
/// run is logged and the next one is still scheduled.
pub async fn start_backup_worker(engine: BackupEngine) {
    let interval = engine.config.backup.interval();

    info!(
        interval_hours = engine.config.backup.interval_hours,
        "starting backup worker"
    );

    loop {
        match engine.run().await {
            Ok(summary) => {
                info!(
                    succeeded = summary.succeeded(),
                    failed = summary.failed(),
                    "scheduled backup run complete"
                );
            }
            Err(e) => {
                error!(error = %e, "scheduled backup run aborted");
            }
        }

        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_summary_totals() {
        let summary = RunSummary {
            started_at: "01-06-2024-00:00:00".to_string(),
            organisations: vec![
                OrgSummary {
                    organisation: "acme".to_string(),
                    attempted: 5,
                    succeeded: 4,
                    failed: 1,
                },
                OrgSummary {
                    organisation: "acme-labs".to_string(),
                    attempted: 2,
                    succeeded: 2,
                    failed: 0,
                },
            ],
            sweep: None,
        };

        assert_eq!(summary.attempted(), 7);
        assert_eq!(summary.succeeded(), 6);
        assert_eq!(summary.failed(), 1);
    }
}

//! Retention sweeping of stored artifacts.
//!
//! After each backup run (and on demand via the `sweep` subcommand), the
//! sweeper lists the bucket's full object set, decodes the run timestamp
//! embedded in each key's leading path segment, and deletes objects older
//! than the configured threshold.
//!
//! The listing always pages to exhaustion: a skipped page would mean
//! expired data survives indefinitely. Keys whose timestamp cannot be
//! decoded are skipped, never deleted on ambiguous data.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::storage::{ObjectStore, StorageError};
use crate::timefmt;

/// Errors from a retention sweep.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    /// The bucket listing failed; the sweep cannot make progress.
    #[error("failed to list stored artifacts: {0}")]
    List(#[source] StorageError),

    /// One or more deletions failed. The sweep continued past them; the
    /// summary carries what was still accomplished.
    #[error("{} of {} expired artifacts could not be deleted", summary.failed, summary.failed + summary.deleted)]
    DeletionsFailed { summary: SweepSummary },
}

/// Results from a single retention sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Objects observed in the listing.
    pub scanned: u64,
    /// Expired objects deleted.
    pub deleted: u64,
    /// Objects whose key timestamp could not be decoded.
    pub skipped: u64,
    /// Expired objects whose deletion failed.
    pub failed: u64,
}

impl SweepSummary {
    /// Objects retained because they are at or under the threshold.
    pub fn retained(&self) -> u64 {
        self.scanned - self.deleted - self.skipped - self.failed
    }

    pub fn has_deletions(&self) -> bool {
        self.deleted > 0
    }
}

/// Delete stored artifacts older than `threshold_days`.
///
/// Deletions are independent and order-insensitive; a failed deletion is
/// logged and the sweep continues, but the overall result still reports
/// the failure so callers can alert without losing progress.
pub async fn sweep(
    store: &dyn ObjectStore,
    threshold_days: u32,
) -> Result<SweepSummary, SweepError> {
    sweep_at(store, threshold_days, Utc::now()).await
}

/// [`sweep`] against an explicit reference instant.
pub(crate) async fn sweep_at(
    store: &dyn ObjectStore,
    threshold_days: u32,
    now: DateTime<Utc>,
) -> Result<SweepSummary, SweepError> {
    let mut summary = SweepSummary::default();
    let mut token = None;

    loop {
        let page = store.list_page(token).await.map_err(SweepError::List)?;

        for object in &page.objects {
            summary.scanned += 1;

            let Some(age_hours) = decoded_age_hours(&object.key, now) else {
                warn!(key = %object.key, "cannot decode artifact timestamp, skipping");
                summary.skipped += 1;
                continue;
            };

            // Whole elapsed hours against the threshold: an artifact aged
            // exactly the threshold is retained, one hour past it is not.
            if age_hours <= i64::from(threshold_days) * 24 {
                continue;
            }

            debug!(key = %object.key, age_hours, "deleting expired artifact");
            match store.delete(&object.key).await {
                Ok(()) => summary.deleted += 1,
                Err(e) => {
                    warn!(key = %object.key, error = %e, "failed to delete expired artifact");
                    summary.failed += 1;
                }
            }
        }

        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    info!(
        scanned = summary.scanned,
        deleted = summary.deleted,
        skipped = summary.skipped,
        failed = summary.failed,
        "retention sweep complete"
    );

    if summary.failed > 0 {
        return Err(SweepError::DeletionsFailed { summary });
    }
    Ok(summary)
}

/// Age in whole hours decoded from the key's leading path segment, or
/// `None` when the segment is not a valid run timestamp.
fn decoded_age_hours(key: &str, now: DateTime<Utc>) -> Option<i64> {
    let prefix = key.split('/').next()?;
    let created = timefmt::parse(prefix).ok()?;
    Some((now - created).num_hours())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::storage::memory::MemoryObjectStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn aged_key(age: Duration, org: &str, repo: &str) -> String {
        format!("{}/{org}/{repo}.tar", timefmt::render(now() - age))
    }

    #[tokio::test]
    async fn test_retention_boundary() {
        let store = MemoryObjectStore::new();
        let at_threshold = aged_key(Duration::days(7), "acme", "edge");
        let past_threshold = aged_key(Duration::days(7) + Duration::hours(1), "acme", "old");
        store.insert(&at_threshold, b"x");
        store.insert(&past_threshold, b"x");

        let summary = sweep_at(&store, 7, now()).await.unwrap();

        assert_eq!(summary.deleted, 1);
        assert_eq!(store.keys(), vec![at_threshold]);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let store = MemoryObjectStore::new();
        store.insert(&aged_key(Duration::days(30), "acme", "old"), b"x");
        store.insert(&aged_key(Duration::days(1), "acme", "fresh"), b"x");

        let first = sweep_at(&store, 7, now()).await.unwrap();
        assert_eq!(first.deleted, 1);

        let second = sweep_at(&store, 7, now()).await.unwrap();
        assert_eq!(second.deleted, 0);
        assert_eq!(second.scanned, 1);
    }

    #[tokio::test]
    async fn test_malformed_key_is_skipped_not_deleted() {
        let store = MemoryObjectStore::new();
        store.insert("not-a-timestamp/acme/repo.tar", b"x");
        store.insert("stray-object", b"x");

        let summary = sweep_at(&store, 7, now()).await.unwrap();

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.deleted, 0);
        assert_eq!(store.keys().len(), 2);
    }

    #[tokio::test]
    async fn test_sweep_pages_to_exhaustion() {
        // 3 pages of 100 plus a final page of 7; every object expired.
        let store = MemoryObjectStore::with_page_size(100);
        for i in 0..307 {
            store.insert(&aged_key(Duration::days(30), "acme", &format!("repo-{i:03}")), b"x");
        }

        let summary = sweep_at(&store, 7, now()).await.unwrap();

        assert_eq!(summary.scanned, 307);
        assert_eq!(summary.deleted, 307);
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_delete_failure_does_not_abort_sweep() {
        let store = MemoryObjectStore::new();
        let stuck = aged_key(Duration::days(30), "acme", "stuck");
        let old = aged_key(Duration::days(30), "acme", "zz-old");
        store.insert(&stuck, b"x");
        store.insert(&old, b"x");
        store.fail_delete(&stuck);

        let err = sweep_at(&store, 7, now()).await.unwrap_err();

        // The sweep finished the remaining objects and still reports failure.
        let SweepError::DeletionsFailed { summary } = err else {
            panic!("expected DeletionsFailed");
        };
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(store.keys(), vec![stuck]);
    }

    #[tokio::test]
    async fn test_summary_retained_count() {
        let store = MemoryObjectStore::new();
        store.insert(&aged_key(Duration::days(1), "acme", "fresh"), b"x");
        store.insert(&aged_key(Duration::days(2), "acme", "also-fresh"), b"x");
        store.insert(&aged_key(Duration::days(30), "acme", "old"), b"x");

        let summary = sweep_at(&store, 7, now()).await.unwrap();
        assert_eq!(summary.retained(), 2);
        assert!(summary.has_deletions());
    }
}

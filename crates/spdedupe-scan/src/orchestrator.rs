//! Scan lifecycle: resolve, enumerate, group, publish.

use std::sync::Arc;

use futures::{StreamExt, stream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use spdedupe_analyze::Grouper;
use spdedupe_core::{
    DuplicateGroup, FileDescriptor, RemoteError, SCAN_CANCELLED_MESSAGE, ScanRegistry, ScanReport,
    ScannerConfig,
};
use spdedupe_graph::{DriveRef, RemoteStore, SiteAddress};

use crate::enumerator::{DriveEnumerator, EnumerationStats};
use crate::progress::{ProgressTracker, ScanPhase, ScanProgress};

/// Message recorded when the site has no drives.
pub const NO_DRIVES_MESSAGE: &str = "No drives found in the site";

/// Why a scan stopped before completion.
enum ScanFailure {
    Cancelled,
    Failed(String),
}

impl From<RemoteError> for ScanFailure {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Cancelled => Self::Cancelled,
            other => Self::Failed(other.to_string()),
        }
    }
}

struct ScanOutcome {
    files_scanned: u64,
    groups: Vec<DuplicateGroup>,
    stats: EnumerationStats,
}

/// Runs scans of whole sites and publishes their reports to the registry.
pub struct ScanOrchestrator {
    store: Arc<dyn RemoteStore>,
    registry: Arc<ScanRegistry>,
    config: ScannerConfig,
    grouper: Grouper,
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl ScanOrchestrator {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        registry: Arc<ScanRegistry>,
        config: ScannerConfig,
    ) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            store,
            registry,
            config,
            grouper: Grouper::new(),
            progress_tx,
        }
    }

    /// Subscribe to progress updates of every scan run by this orchestrator.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    pub fn registry(&self) -> &Arc<ScanRegistry> {
        &self.registry
    }

    /// Scan a site and return the final report.
    ///
    /// The report is published in state `InProgress` before the first remote
    /// call, so it can be polled by id while the scan runs. Failures and
    /// cancellation yield a `Failed` report rather than an error.
    pub async fn scan_site(&self, site_url: &str, cancel: &CancellationToken) -> ScanReport {
        let mut report = ScanReport::new(site_url);
        self.registry.insert_report(report.clone());

        let tracker = ProgressTracker::new(report.scan_id.clone(), self.progress_tx.clone());
        info!(scan_id = %report.scan_id, site_url, "Starting scan");

        match self.run(&report.scan_id, site_url, &tracker, cancel).await {
            Ok(outcome) => {
                report.complete(outcome.files_scanned, outcome.groups);
                info!(
                    scan_id = %report.scan_id,
                    files = report.total_files_scanned,
                    groups = report.duplicate_groups.len(),
                    wasted = report.total_space_wasted,
                    directories = outcome.stats.directories_listed,
                    skipped = outcome.stats.directories_skipped,
                    "Scan completed"
                );
            }
            Err(ScanFailure::Cancelled) => {
                warn!(scan_id = %report.scan_id, site_url, "Scan was cancelled");
                report.total_files_scanned = tracker.files_scanned();
                report.fail(SCAN_CANCELLED_MESSAGE);
            }
            Err(ScanFailure::Failed(message)) => {
                error!(scan_id = %report.scan_id, site_url, error = %message, "Scan failed");
                report.total_files_scanned = tracker.files_scanned();
                report.fail(message);
            }
        }

        self.registry.insert_report(report.clone());
        tracker.publish(ScanPhase::Finished, None);
        report
    }

    async fn run(
        &self,
        scan_id: &str,
        site_url: &str,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, ScanFailure> {
        tracker.publish(ScanPhase::Resolving, None);

        let site = SiteAddress::parse(site_url)
            .ok_or_else(|| ScanFailure::Failed(format!("Invalid site URL: {site_url}")))?;
        let site_id = self.store.resolve_site(&site, cancel).await?;
        let drives = self.store.list_drives(&site_id, cancel).await?;
        if drives.is_empty() {
            return Err(ScanFailure::Failed(NO_DRIVES_MESSAGE.to_string()));
        }

        tracker.set_drives_total(drives.len());
        tracker.publish(ScanPhase::Enumerating, None);

        // `buffered` keeps drive order, so grouping input is deterministic.
        let tasks: Vec<_> = drives
            .iter()
            .map(|drive| self.enumerate_drive(scan_id, &site_id, drive, tracker, cancel))
            .collect();
        let results: Vec<_> = stream::iter(tasks)
            .buffered(self.config.drive_concurrency.max(1))
            .collect()
            .await;

        let mut files = Vec::new();
        let mut stats = EnumerationStats::default();
        for result in results {
            let (drive_files, drive_stats) = result?;
            files.extend(drive_files);
            stats.merge(&drive_stats);
        }

        if cancel.is_cancelled() {
            return Err(ScanFailure::Cancelled);
        }

        tracker.publish(ScanPhase::Grouping, None);
        let files_scanned = files.len() as u64;
        let grouped = self.grouper.group(files);

        Ok(ScanOutcome {
            files_scanned,
            groups: grouped.groups,
            stats,
        })
    }

    async fn enumerate_drive(
        &self,
        scan_id: &str,
        site_id: &str,
        drive: &DriveRef,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<(Vec<FileDescriptor>, EnumerationStats), RemoteError> {
        info!(scan_id, drive_id = %drive.id, drive = %drive.name, "Scanning drive");

        let interval = self.config.progress_interval.max(1);
        let mut enumerator = DriveEnumerator::new(
            self.store.as_ref(),
            site_id,
            &drive.id,
            self.config.max_pages_per_directory,
            cancel.clone(),
        );

        let mut files = Vec::new();
        while let Some(file) = enumerator.next_file().await? {
            files.push(file);
            let total = tracker.record_file();
            if total % interval == 0 {
                self.registry
                    .update_report(scan_id, |r| r.total_files_scanned = total);
                tracker.publish(ScanPhase::Enumerating, Some(&drive.name));
            }
        }

        tracker.record_drive_done();
        tracker.publish(ScanPhase::Enumerating, Some(&drive.name));
        Ok((files, enumerator.stats()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spdedupe_core::ScanStatus;
    use spdedupe_graph::{Hashes, MemoryStore, ROOT_ID};

    const SITE: &str = "https://contoso.sharepoint.com/sites/team";

    fn orchestrator(store: Arc<MemoryStore>) -> ScanOrchestrator {
        ScanOrchestrator::new(store, Arc::new(ScanRegistry::new()), ScannerConfig::default())
    }

    #[tokio::test]
    async fn test_invalid_url_fails_scan() {
        let orchestrator = orchestrator(Arc::new(MemoryStore::new()));
        let report = orchestrator
            .scan_site("not a url", &CancellationToken::new())
            .await;
        assert_eq!(report.status, ScanStatus::Failed);
        assert!(report.error_message.unwrap().starts_with("Invalid site URL"));
    }

    #[tokio::test]
    async fn test_no_drives_fails_scan() {
        let store = Arc::new(MemoryStore::new());
        store.add_site(SITE);
        let orchestrator = orchestrator(store);

        let report = orchestrator.scan_site(SITE, &CancellationToken::new()).await;
        assert_eq!(report.status, ScanStatus::Failed);
        assert_eq!(report.error_message.as_deref(), Some(NO_DRIVES_MESSAGE));
    }

    #[tokio::test]
    async fn test_progress_is_published() {
        let store = Arc::new(MemoryStore::new());
        let site = store.add_site(SITE);
        let drive = store.add_drive(&site, "Documents");
        store.add_file(&drive, ROOT_ID, "a.txt", 1, Hashes::quick_xor("a"));

        let orchestrator = orchestrator(store);
        let mut rx = orchestrator.subscribe();
        orchestrator.scan_site(SITE, &CancellationToken::new()).await;

        let mut phases = Vec::new();
        while let Ok(progress) = rx.try_recv() {
            phases.push(progress.phase);
        }
        assert_eq!(phases.first(), Some(&ScanPhase::Resolving));
        assert_eq!(phases.last(), Some(&ScanPhase::Finished));
        assert!(phases.contains(&ScanPhase::Grouping));
    }
}

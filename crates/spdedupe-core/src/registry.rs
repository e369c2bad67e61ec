//! Process-wide store of scan reports and shortcut manifests.

use dashmap::DashMap;

use crate::model::{ContentHash, FileDescriptor, ScanReport, ShortcutEntry, ShortcutManifest};

/// Concurrent registry keyed by scan id.
///
/// Every mutation happens inside a single map-entry guard, and no guard is
/// ever returned to the caller, so no lock can be held across a remote call.
#[derive(Debug, Default)]
pub struct ScanRegistry {
    reports: DashMap<String, ScanReport>,
    manifests: DashMap<String, ShortcutManifest>,
}

impl ScanRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a report, replacing any report with the same id.
    pub fn insert_report(&self, report: ScanReport) {
        self.reports.insert(report.scan_id.clone(), report);
    }

    /// Snapshot of a report.
    pub fn report(&self, scan_id: &str) -> Option<ScanReport> {
        self.reports.get(scan_id).map(|r| r.value().clone())
    }

    /// Snapshots of all reports, newest first.
    pub fn reports(&self) -> Vec<ScanReport> {
        let mut reports: Vec<ScanReport> = self.reports.iter().map(|r| r.value().clone()).collect();
        reports.sort_by(|a, b| b.scan_date.cmp(&a.scan_date));
        reports
    }

    /// Mutate a report in place.
    pub fn update_report<R>(
        &self,
        scan_id: &str,
        f: impl FnOnce(&mut ScanReport) -> R,
    ) -> Option<R> {
        self.reports.get_mut(scan_id).map(|mut r| f(r.value_mut()))
    }

    /// Record the keep copy of a group. Returns the kept file, or `None` when
    /// the scan, group or member is unknown.
    pub fn select_keep_copy(
        &self,
        scan_id: &str,
        key: &ContentHash,
        file_id: &str,
    ) -> Option<FileDescriptor> {
        let mut report = self.reports.get_mut(scan_id)?;
        let group = report
            .duplicate_groups
            .iter_mut()
            .find(|g| g.hash_algorithm == key.algorithm && g.hash == key.digest)?;
        let keep = group.member(file_id)?.clone();
        group.selected_true_copy = Some(keep.clone());
        Some(keep)
    }

    /// Append shortcut entries to a scan's manifest, creating it if needed.
    pub fn append_shortcuts(&self, scan_id: &str, entries: impl IntoIterator<Item = ShortcutEntry>) {
        self.manifests
            .entry(scan_id.to_string())
            .or_insert_with(|| ShortcutManifest::new(scan_id))
            .entries
            .extend(entries);
    }

    /// Make sure a manifest exists for the scan, even if it stays empty.
    pub fn ensure_manifest(&self, scan_id: &str) {
        self.manifests
            .entry(scan_id.to_string())
            .or_insert_with(|| ShortcutManifest::new(scan_id));
    }

    /// Snapshot of a scan's manifest.
    pub fn manifest(&self, scan_id: &str) -> Option<ShortcutManifest> {
        self.manifests.get(scan_id).map(|m| m.value().clone())
    }

    /// Number of known scans.
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// Check if no scan has been registered.
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

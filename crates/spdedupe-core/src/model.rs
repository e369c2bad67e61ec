//! Scan, replacement and verification data model.
//!
//! All types serialize to the camelCase JSON shapes exposed by the HTTP
//! surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;

/// Algorithm the remote used to compute a file hash.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum HashAlgorithm {
    #[default]
    QuickXor,
    Sha1,
    Sha256,
    Crc32,
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QuickXor => write!(f, "quickXor"),
            Self::Sha1 => write!(f, "sha1"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Crc32 => write!(f, "crc32"),
        }
    }
}

/// Key of a duplicate group: digest qualified by its algorithm.
///
/// Digests from different algorithms never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash {
    pub algorithm: HashAlgorithm,
    pub digest: String,
}

impl ContentHash {
    pub fn new(algorithm: HashAlgorithm, digest: impl Into<String>) -> Self {
        Self {
            algorithm,
            digest: digest.into(),
        }
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

/// A file discovered on a drive. Immutable once produced by the enumerator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    /// Item id, unique within the drive.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Path from the drive root, forward-slash separated.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Upstream content hash, empty when the remote supplied none.
    pub hash: String,
    /// Algorithm of `hash`, absent when `hash` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_algorithm: Option<HashAlgorithm>,
    pub last_modified: Option<DateTime<Utc>>,
    pub web_url: String,
    pub site_id: String,
    pub drive_id: String,
}

impl FileDescriptor {
    /// Group key of this file, `None` when it carries no hash.
    pub fn content_hash(&self) -> Option<ContentHash> {
        if self.hash.is_empty() {
            return None;
        }
        Some(ContentHash::new(
            self.hash_algorithm.unwrap_or_default(),
            self.hash.clone(),
        ))
    }
}

/// Two or more files sharing a non-empty content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    /// Digest shared by all members.
    pub hash: String,
    pub hash_algorithm: HashAlgorithm,
    /// Size of each file in bytes, taken from the first member.
    pub file_size: u64,
    /// Wasted space: `file_size * (members - 1)`.
    pub total_wasted_space: u64,
    pub files: Vec<FileDescriptor>,
    /// The member the operator chose to keep.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_true_copy: Option<FileDescriptor>,
}

impl DuplicateGroup {
    /// Build a group from its key and members (in enumeration order).
    pub fn new(key: ContentHash, files: Vec<FileDescriptor>) -> Self {
        let file_size = files.first().map(|f| f.size).unwrap_or(0);
        let total_wasted_space = file_size.saturating_mul((files.len() as u64).saturating_sub(1));
        Self {
            hash: key.digest,
            hash_algorithm: key.algorithm,
            file_size,
            total_wasted_space,
            files,
            selected_true_copy: None,
        }
    }

    /// Group key.
    pub fn key(&self) -> ContentHash {
        ContentHash::new(self.hash_algorithm, self.hash.clone())
    }

    /// Number of member files.
    pub fn count(&self) -> usize {
        self.files.len()
    }

    /// How many files could be replaced if one is kept.
    pub fn deletable_count(&self) -> usize {
        self.files.len().saturating_sub(1)
    }

    /// Look up a member by item id.
    pub fn member(&self, file_id: &str) -> Option<&FileDescriptor> {
        self.files.iter().find(|f| f.id == file_id)
    }

    /// Id of the chosen keep copy.
    pub fn selected_keep_id(&self) -> Option<&str> {
        self.selected_true_copy.as_ref().map(|f| f.id.as_str())
    }

    /// Whether a selection naming `hash` (and optionally its algorithm) targets this group.
    pub fn matches(&self, hash: &str, algorithm: Option<HashAlgorithm>) -> bool {
        self.hash == hash && algorithm.is_none_or(|a| a == self.hash_algorithm)
    }
}

/// Lifecycle state of a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    #[default]
    InProgress,
    Completed,
    Failed,
}

/// Result of scanning one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub scan_id: String,
    pub scan_date: DateTime<Utc>,
    pub site_url: String,
    pub total_files_scanned: u64,
    /// Sum of member counts over all groups.
    pub duplicate_files_found: u64,
    /// Sum of wasted space over all groups.
    pub total_space_wasted: u64,
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub status: ScanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ScanReport {
    /// Create an in-progress report with a fresh scan id.
    pub fn new(site_url: impl Into<String>) -> Self {
        Self {
            scan_id: Uuid::new_v4().to_string(),
            scan_date: Utc::now(),
            site_url: site_url.into(),
            total_files_scanned: 0,
            duplicate_files_found: 0,
            total_space_wasted: 0,
            duplicate_groups: Vec::new(),
            status: ScanStatus::InProgress,
            error_message: None,
        }
    }

    /// Populate totals from the grouping result and mark the scan completed.
    pub fn complete(&mut self, total_files_scanned: u64, groups: Vec<DuplicateGroup>) {
        self.total_files_scanned = total_files_scanned;
        self.duplicate_files_found = groups.iter().map(|g| g.count() as u64).sum();
        self.total_space_wasted = groups.iter().map(|g| g.total_wasted_space).sum();
        self.duplicate_groups = groups;
        self.status = ScanStatus::Completed;
        self.error_message = None;
    }

    /// Mark the scan failed.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = ScanStatus::Failed;
        self.error_message = Some(message.into());
    }

    /// Whether the scan has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        self.status != ScanStatus::InProgress
    }

    /// Find the group a selection targets.
    pub fn find_group(
        &self,
        hash: &str,
        algorithm: Option<HashAlgorithm>,
    ) -> Option<&DuplicateGroup> {
        self.duplicate_groups
            .iter()
            .find(|g| g.matches(hash, algorithm))
    }
}

/// One shortcut produced by a replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortcutEntry {
    /// Drive the shortcut was written to.
    pub drive_id: String,
    /// Path of the shortcut from the drive root.
    pub path: String,
    /// Path of the kept original.
    pub target_path: String,
    /// URL the shortcut points at.
    pub target_url: String,
}

/// Shortcuts produced for one scan, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortcutManifest {
    pub scan_id: String,
    pub entries: Vec<ShortcutEntry>,
}

impl ShortcutManifest {
    pub fn new(scan_id: impl Into<String>) -> Self {
        Self {
            scan_id: scan_id.into(),
            entries: Vec::new(),
        }
    }

    /// Shortcut paths in creation order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Operator's choice of keep copy for one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplacementSelection {
    pub hash: String,
    /// Disambiguates digests that exist under more than one algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_algorithm: Option<HashAlgorithm>,
    pub true_copy_file_id: String,
}

/// Request to replace duplicates of a scan with shortcuts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplacementRequest {
    pub scan_id: String,
    pub selections: Vec<ReplacementSelection>,
}

/// Outcome of replacing one duplicate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementDetail {
    pub original_file_id: String,
    pub original_path: String,
    /// Set once the shortcut upload succeeded.
    pub shortcut_path: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// Outcome of a replacement run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementResult {
    pub scan_id: String,
    pub total_replacements: u64,
    pub successful_replacements: u64,
    pub failed_replacements: u64,
    pub details: Vec<ReplacementDetail>,
    pub all_successful: bool,
    /// The run stopped early because it was cancelled.
    pub cancelled: bool,
}

impl ReplacementResult {
    pub fn new(scan_id: impl Into<String>) -> Self {
        Self {
            scan_id: scan_id.into(),
            all_successful: true,
            ..Default::default()
        }
    }

    /// Record the outcome of one duplicate and update the counters.
    pub fn record(&mut self, detail: ReplacementDetail) {
        self.total_replacements += 1;
        if detail.success {
            self.successful_replacements += 1;
        } else {
            self.failed_replacements += 1;
        }
        self.all_successful = self.failed_replacements == 0;
        self.details.push(detail);
    }
}

/// A shortcut that could not be confirmed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokenShortcutDetail {
    pub shortcut_path: String,
    pub target_path: String,
    pub issue: String,
}

/// Outcome of verifying the shortcuts of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub scan_id: String,
    pub verification_date: DateTime<Utc>,
    pub total_shortcuts_checked: u64,
    pub valid_shortcuts: u64,
    pub broken_shortcuts: u64,
    pub broken_details: Vec<BrokenShortcutDetail>,
    pub all_valid: bool,
}

impl VerificationResult {
    pub fn new(scan_id: impl Into<String>) -> Self {
        Self {
            scan_id: scan_id.into(),
            verification_date: Utc::now(),
            total_shortcuts_checked: 0,
            valid_shortcuts: 0,
            broken_shortcuts: 0,
            broken_details: Vec::new(),
            all_valid: true,
        }
    }

    pub fn record_valid(&mut self) {
        self.total_shortcuts_checked += 1;
        self.valid_shortcuts += 1;
    }

    pub fn record_broken(&mut self, detail: BrokenShortcutDetail) {
        self.total_shortcuts_checked += 1;
        self.broken_shortcuts += 1;
        self.all_valid = false;
        self.broken_details.push(detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: &str, hash: &str, size: u64) -> FileDescriptor {
        FileDescriptor {
            id: id.into(),
            name: format!("{id}.txt"),
            path: format!("/docs/{id}.txt"),
            size,
            hash: hash.into(),
            hash_algorithm: (!hash.is_empty()).then_some(HashAlgorithm::QuickXor),
            last_modified: None,
            web_url: format!("https://contoso.sharepoint.com/docs/{id}.txt"),
            site_id: "site".into(),
            drive_id: "drive".into(),
        }
    }

    #[test]
    fn test_group_wasted_space() {
        let key = ContentHash::new(HashAlgorithm::QuickXor, "X");
        let group = DuplicateGroup::new(key.clone(), vec![file("a", "X", 10), file("b", "X", 10)]);
        assert_eq!(group.count(), 2);
        assert_eq!(group.deletable_count(), 1);
        assert_eq!(group.total_wasted_space, 10);
        assert_eq!(group.key(), key);
    }

    #[test]
    fn test_group_wasted_space_saturates() {
        let group = DuplicateGroup::new(
            ContentHash::new(HashAlgorithm::QuickXor, "X"),
            vec![
                file("a", "X", u64::MAX),
                file("b", "X", u64::MAX),
                file("c", "X", u64::MAX),
            ],
        );
        assert_eq!(group.total_wasted_space, u64::MAX);
    }

    #[test]
    fn test_group_matching_by_algorithm() {
        let group = DuplicateGroup::new(
            ContentHash::new(HashAlgorithm::Sha1, "abc"),
            vec![file("a", "abc", 1), file("b", "abc", 1)],
        );
        assert!(group.matches("abc", None));
        assert!(group.matches("abc", Some(HashAlgorithm::Sha1)));
        assert!(!group.matches("abc", Some(HashAlgorithm::QuickXor)));
        assert!(!group.matches("abd", None));
    }

    #[test]
    fn test_empty_hash_has_no_key() {
        assert!(file("p", "", 5).content_hash().is_none());
        assert!(file("q", "Y", 5).content_hash().is_some());
    }

    #[test]
    fn test_report_completion_totals() {
        let mut report = ScanReport::new("https://contoso.sharepoint.com/sites/team");
        assert_eq!(report.status, ScanStatus::InProgress);

        let groups = vec![
            DuplicateGroup::new(
                ContentHash::new(HashAlgorithm::QuickXor, "X"),
                vec![file("a", "X", 10), file("b", "X", 10), file("c", "X", 10)],
            ),
            DuplicateGroup::new(
                ContentHash::new(HashAlgorithm::QuickXor, "Y"),
                vec![file("d", "Y", 4), file("e", "Y", 4)],
            ),
        ];
        report.complete(9, groups);

        assert_eq!(report.status, ScanStatus::Completed);
        assert_eq!(report.total_files_scanned, 9);
        assert_eq!(report.duplicate_files_found, 5);
        assert_eq!(report.total_space_wasted, 24);
        assert!(report.is_terminal());
    }

    #[test]
    fn test_replacement_counters() {
        let mut result = ReplacementResult::new("scan");
        assert!(result.all_successful);

        result.record(ReplacementDetail {
            success: true,
            ..Default::default()
        });
        result.record(ReplacementDetail {
            success: false,
            error_message: Some("denied".into()),
            error_kind: Some(ErrorKind::Unauthorized),
            ..Default::default()
        });

        assert_eq!(result.total_replacements, 2);
        assert_eq!(result.successful_replacements, 1);
        assert_eq!(result.failed_replacements, 1);
        assert!(!result.all_successful);
    }

    #[test]
    fn test_verification_counters_add_up() {
        let mut result = VerificationResult::new("scan");
        result.record_valid();
        result.record_broken(BrokenShortcutDetail {
            shortcut_path: "dir/b.url".into(),
            target_path: "/dir/a.txt".into(),
            issue: "Shortcut file not found".into(),
        });
        assert_eq!(result.total_shortcuts_checked, 2);
        assert_eq!(
            result.valid_shortcuts + result.broken_shortcuts,
            result.total_shortcuts_checked
        );
        assert!(!result.all_valid);
    }
}

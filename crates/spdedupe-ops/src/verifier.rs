//! Check that recorded shortcuts still exist.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use spdedupe_core::{
    BrokenShortcutDetail, DedupeError, RemoteError, ScanRegistry, VerificationResult, path,
};
use spdedupe_graph::RemoteStore;

/// Issue recorded when nothing exists at a shortcut's path.
pub const SHORTCUT_MISSING_ISSUE: &str = "Shortcut file not found";

pub struct Verifier {
    store: Arc<dyn RemoteStore>,
    registry: Arc<ScanRegistry>,
}

impl Verifier {
    pub fn new(store: Arc<dyn RemoteStore>, registry: Arc<ScanRegistry>) -> Self {
        Self { store, registry }
    }

    /// Look up every shortcut recorded for `scan_id` and report the ones that
    /// are gone or cannot be read. Only existence is checked.
    pub async fn verify(
        &self,
        scan_id: &str,
        cancel: &CancellationToken,
    ) -> Result<VerificationResult, DedupeError> {
        if scan_id.trim().is_empty() {
            return Err(DedupeError::invalid_input("Scan ID is required"));
        }
        let manifest = self
            .registry
            .manifest(scan_id)
            .ok_or_else(|| DedupeError::not_found("Shortcut manifest", scan_id))?;
        if self.registry.report(scan_id).is_none() {
            return Err(DedupeError::not_found("Scan report", scan_id));
        }

        info!(scan_id, shortcuts = manifest.len(), "Verifying shortcuts");
        let mut result = VerificationResult::new(scan_id);

        for entry in &manifest.entries {
            let drive_path = path::normalize_dir(&entry.path);
            let issue = match self
                .store
                .get_item_by_path(&entry.drive_id, &drive_path, cancel)
                .await
            {
                Ok(Some(_)) => None,
                Ok(None) => Some(SHORTCUT_MISSING_ISSUE.to_string()),
                Err(RemoteError::Cancelled) => return Err(DedupeError::Cancelled),
                Err(err) => Some(err.issue_text()),
            };

            match issue {
                None => {
                    debug!(path = %entry.path, "Shortcut present");
                    result.record_valid();
                }
                Some(issue) => {
                    warn!(path = %entry.path, %issue, "Broken shortcut");
                    result.record_broken(BrokenShortcutDetail {
                        shortcut_path: entry.path.clone(),
                        target_path: entry.target_path.clone(),
                        issue,
                    });
                }
            }
        }

        info!(
            scan_id,
            valid = result.valid_shortcuts,
            broken = result.broken_shortcuts,
            "Verification finished"
        );
        Ok(result)
    }
}

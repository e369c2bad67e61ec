//! Replace duplicates with shortcuts to the kept copy.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use spdedupe_core::{
    DedupeError, ErrorKind, FileDescriptor, RemoteError, ReplacementDetail, ReplacementRequest,
    ReplacementResult, ScanRegistry, ScanStatus, ShortcutEntry,
};
use spdedupe_graph::RemoteStore;

use crate::shortcut::{ShortcutLocation, shortcut_body};

/// Outcome of one replace transaction.
struct Transaction {
    detail: ReplacementDetail,
    /// Present whenever the shortcut was written, even if the delete failed.
    shortcut: Option<ShortcutEntry>,
}

/// Materialises shortcuts for the non-kept members of duplicate groups.
pub struct Replacer {
    store: Arc<dyn RemoteStore>,
    registry: Arc<ScanRegistry>,
}

impl Replacer {
    pub fn new(store: Arc<dyn RemoteStore>, registry: Arc<ScanRegistry>) -> Self {
        Self { store, registry }
    }

    /// Apply the operator's selections to a completed scan.
    ///
    /// Unknown hashes and keep ids are skipped. Each duplicate is handled by
    /// its own transaction: the shortcut is uploaded first and the duplicate
    /// deleted only after the upload succeeded. Failures are recorded per item
    /// and never stop the run. Cancellation stops new transactions from
    /// starting; one already started runs to completion.
    pub async fn replace(
        &self,
        request: &ReplacementRequest,
        cancel: &CancellationToken,
    ) -> Result<ReplacementResult, DedupeError> {
        validate(request)?;
        let scan_id = request.scan_id.as_str();

        let report = self
            .registry
            .report(scan_id)
            .ok_or_else(|| DedupeError::not_found("Scan report", scan_id))?;
        if report.status != ScanStatus::Completed {
            return Err(DedupeError::invalid_input(format!(
                "Scan {scan_id} has not completed"
            )));
        }

        info!(scan_id, selections = request.selections.len(), "Replacing duplicates with shortcuts");
        self.registry.ensure_manifest(scan_id);
        let mut result = ReplacementResult::new(scan_id);

        'selections: for selection in &request.selections {
            let Some(group) = report.find_group(&selection.hash, selection.hash_algorithm) else {
                warn!(scan_id, hash = %selection.hash, "Selection names no known group, skipped");
                continue;
            };
            let Some(keep) =
                self.registry
                    .select_keep_copy(scan_id, &group.key(), &selection.true_copy_file_id)
            else {
                warn!(
                    scan_id,
                    hash = %selection.hash,
                    file_id = %selection.true_copy_file_id,
                    "Keep copy is not a member of the group, skipped"
                );
                continue;
            };

            for duplicate in group.files.iter().filter(|f| f.id != keep.id) {
                if cancel.is_cancelled() {
                    warn!(scan_id, "Replacement cancelled");
                    result.cancelled = true;
                    break 'selections;
                }

                let transaction = self.replace_one(&keep, duplicate).await;
                if let Some(entry) = transaction.shortcut {
                    self.registry.append_shortcuts(scan_id, [entry]);
                }
                result.record(transaction.detail);
            }
        }

        info!(
            scan_id,
            total = result.total_replacements,
            successful = result.successful_replacements,
            failed = result.failed_replacements,
            "Replacement finished"
        );
        Ok(result)
    }

    /// Upload the shortcut, then delete the duplicate. Nothing is touched when
    /// the shortcut path is taken by the duplicate or the kept copy.
    async fn replace_one(&self, keep: &FileDescriptor, duplicate: &FileDescriptor) -> Transaction {
        // Both calls run to completion once the transaction has started.
        let token = CancellationToken::new();
        let location = ShortcutLocation::for_file(&duplicate.path, &duplicate.name);
        let mut detail = ReplacementDetail {
            original_file_id: duplicate.id.clone(),
            original_path: duplicate.path.clone(),
            ..Default::default()
        };

        // Writing the shortcut over the keep copy or the duplicate itself would
        // lose data once the duplicate is deleted.
        let clash = if location.collides_with(&duplicate.path) {
            Some("the duplicate itself")
        } else if keep.drive_id == duplicate.drive_id && location.collides_with(&keep.path) {
            Some("the kept copy")
        } else {
            None
        };
        if let Some(target) = clash {
            let message = format!(
                "Shortcut path {} would overwrite {target}",
                location.display_path()
            );
            warn!(path = %duplicate.path, "{message}, skipped");
            detail.error_message = Some(message);
            detail.error_kind = Some(ErrorKind::InvalidInput);
            return Transaction {
                detail,
                shortcut: None,
            };
        }

        let body = shortcut_body(&keep.web_url).into_bytes();
        if let Err(err) = self
            .store
            .upload_content(&duplicate.drive_id, &location.drive_path(), body, &token)
            .await
        {
            log_failure(&err, &duplicate.path, "uploading shortcut");
            fail(&mut detail, &err);
            return Transaction {
                detail,
                shortcut: None,
            };
        }

        detail.shortcut_path = location.display_path();
        let shortcut = Some(ShortcutEntry {
            drive_id: duplicate.drive_id.clone(),
            path: detail.shortcut_path.clone(),
            target_path: keep.path.clone(),
            target_url: keep.web_url.clone(),
        });

        match self
            .store
            .delete_item(&duplicate.drive_id, &duplicate.id, &token)
            .await
        {
            Ok(()) => {
                info!(path = %duplicate.path, shortcut = %detail.shortcut_path, "Replaced file with shortcut");
                detail.success = true;
            }
            Err(err) => {
                log_failure(&err, &duplicate.path, "deleting duplicate");
                fail(&mut detail, &err);
            }
        }

        Transaction { detail, shortcut }
    }
}

fn validate(request: &ReplacementRequest) -> Result<(), DedupeError> {
    if request.scan_id.trim().is_empty() {
        return Err(DedupeError::invalid_input("Scan ID is required"));
    }
    if request.selections.is_empty() {
        return Err(DedupeError::invalid_input(
            "At least one replacement selection is required",
        ));
    }
    Ok(())
}

fn fail(detail: &mut ReplacementDetail, err: &RemoteError) {
    detail.success = false;
    detail.error_message = Some(err.to_string());
    detail.error_kind = Some(err.kind());
}

fn log_failure(err: &RemoteError, path: &str, step: &str) {
    error!(kind = %err.kind(), path, step, error = %err, "Replacing file failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use spdedupe_core::ReplacementSelection;
    use spdedupe_graph::MemoryStore;

    fn replacer() -> Replacer {
        Replacer::new(Arc::new(MemoryStore::new()), Arc::new(ScanRegistry::new()))
    }

    fn selection() -> ReplacementSelection {
        ReplacementSelection {
            hash: "X".into(),
            hash_algorithm: None,
            true_copy_file_id: "a".into(),
        }
    }

    #[tokio::test]
    async fn test_missing_scan_id_is_invalid() {
        let request = ReplacementRequest {
            scan_id: " ".into(),
            selections: vec![selection()],
        };
        let err = replacer()
            .replace(&request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Scan ID is required");
    }

    #[tokio::test]
    async fn test_empty_selections_are_invalid() {
        let request = ReplacementRequest {
            scan_id: "scan".into(),
            selections: vec![],
        };
        let err = replacer()
            .replace(&request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "At least one replacement selection is required");
    }

    #[tokio::test]
    async fn test_unknown_scan_is_not_found() {
        let request = ReplacementRequest {
            scan_id: "missing".into(),
            selections: vec![selection()],
        };
        let err = replacer()
            .replace(&request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DedupeError::NotFound { .. }));
    }
}

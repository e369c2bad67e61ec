use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use spdedupe_core::{ErrorKind, SCAN_CANCELLED_MESSAGE, ScanRegistry, ScanStatus, ScannerConfig};
use spdedupe_graph::{Hashes, MemoryStore, ROOT_ID, StoreCall, StoreOp};
use spdedupe_scan::{DriveEnumerator, ScanOrchestrator};

const SITE: &str = "https://contoso.sharepoint.com/sites/team";

fn orchestrator(store: Arc<MemoryStore>, registry: Arc<ScanRegistry>) -> ScanOrchestrator {
    ScanOrchestrator::new(store, registry, ScannerConfig::default())
}

#[tokio::test]
async fn test_basic_duplicate_detection() {
    let store = Arc::new(MemoryStore::new());
    let site = store.add_site(SITE);
    let drive = store.add_drive(&site, "Documents");
    store.add_file(&drive, ROOT_ID, "a.txt", 10, Hashes::quick_xor("X"));
    store.add_file(&drive, ROOT_ID, "b.txt", 10, Hashes::quick_xor("X"));
    store.add_file(&drive, ROOT_ID, "c.txt", 20, Hashes::quick_xor("Y"));

    let registry = Arc::new(ScanRegistry::new());
    let report = orchestrator(store, registry.clone())
        .scan_site(SITE, &CancellationToken::new())
        .await;

    assert_eq!(report.status, ScanStatus::Completed);
    assert_eq!(report.total_files_scanned, 3);
    assert_eq!(report.duplicate_files_found, 2);
    assert_eq!(report.total_space_wasted, 10);
    assert_eq!(report.duplicate_groups.len(), 1);

    let group = &report.duplicate_groups[0];
    assert_eq!(group.hash, "X");
    assert_eq!(group.files.len(), 2);
    assert_eq!(group.total_wasted_space, 10);

    assert_eq!(registry.report(&report.scan_id), Some(report));
}

#[tokio::test]
async fn test_empty_hashes_produce_no_groups() {
    let store = Arc::new(MemoryStore::new());
    let site = store.add_site(SITE);
    let drive = store.add_drive(&site, "Documents");
    store.add_file(&drive, ROOT_ID, "p", 5, Hashes::quick_xor(""));
    store.add_file(&drive, ROOT_ID, "q", 5, Hashes::default());

    let report = orchestrator(store, Arc::new(ScanRegistry::new()))
        .scan_site(SITE, &CancellationToken::new())
        .await;

    assert_eq!(report.status, ScanStatus::Completed);
    assert_eq!(report.total_files_scanned, 2);
    assert!(report.duplicate_groups.is_empty());
}

#[tokio::test]
async fn test_pagination_is_exhausted() {
    let store = MemoryStore::new().with_page_size(200);
    let site = store.add_site(SITE);
    let drive = store.add_drive(&site, "Documents");
    let big = store.add_folder(&drive, ROOT_ID, "big");
    for i in 0..600 {
        store.add_file(&drive, &big, &format!("f{i}.bin"), 1, Hashes::quick_xor(format!("h{i}")));
    }

    let mut enumerator = DriveEnumerator::new(&store, &site, &drive, 10_000, CancellationToken::new());
    let mut from_big = 0;
    while let Some(file) = enumerator.next_file().await.unwrap() {
        if file.path.starts_with("/big/") {
            from_big += 1;
        }
    }

    assert_eq!(from_big, 600);
    let big_pages = store
        .calls()
        .into_iter()
        .filter(|c| matches!(c, StoreCall::ListChildren { item_id, .. } if *item_id == big))
        .count();
    assert_eq!(big_pages, 3);
}

#[tokio::test]
async fn test_in_progress_report_is_published_before_remote_calls() {
    let registry = Arc::new(ScanRegistry::new());
    let observed = Arc::new(Mutex::new(Vec::new()));

    let hook_registry = registry.clone();
    let hook_observed = observed.clone();
    let store = Arc::new(MemoryStore::new().with_call_hook(move |call| {
        if call.op() == StoreOp::ResolveSite {
            let statuses = hook_registry.reports().into_iter().map(|r| r.status);
            hook_observed.lock().unwrap().extend(statuses);
        }
    }));
    let site = store.add_site(SITE);
    let drive = store.add_drive(&site, "Documents");
    store.add_file(&drive, ROOT_ID, "a.txt", 1, Hashes::quick_xor("a"));

    let report = orchestrator(store, registry.clone())
        .scan_site(SITE, &CancellationToken::new())
        .await;

    assert_eq!(*observed.lock().unwrap(), vec![ScanStatus::InProgress]);
    assert_eq!(
        registry.report(&report.scan_id).map(|r| r.status),
        Some(ScanStatus::Completed)
    );
}

#[tokio::test]
async fn test_cancellation_fails_scan_with_partial_report() {
    let cancel = CancellationToken::new();
    let hook_cancel = cancel.clone();
    let store = Arc::new(MemoryStore::new().with_page_size(1).with_call_hook(move |call| {
        if let StoreCall::ListChildren { page: Some(_), .. } = call {
            hook_cancel.cancel();
        }
    }));
    let site = store.add_site(SITE);
    let drive = store.add_drive(&site, "Documents");
    store.add_file(&drive, ROOT_ID, "a.txt", 1, Hashes::quick_xor("a"));
    store.add_file(&drive, ROOT_ID, "b.txt", 1, Hashes::quick_xor("a"));

    let registry = Arc::new(ScanRegistry::new());
    let report = orchestrator(store, registry.clone())
        .scan_site(SITE, &cancel)
        .await;

    assert_eq!(report.status, ScanStatus::Failed);
    assert_eq!(report.error_message.as_deref(), Some(SCAN_CANCELLED_MESSAGE));
    assert_eq!(report.total_files_scanned, 1);
    assert!(report.duplicate_groups.is_empty());
    assert_eq!(registry.report(&report.scan_id), Some(report));
}

#[tokio::test]
async fn test_unresolvable_site_fails_scan() {
    let store = Arc::new(MemoryStore::new());
    store.add_site(SITE);
    store.fail_resolve(ErrorKind::Unauthorized);

    let report = orchestrator(store, Arc::new(ScanRegistry::new()))
        .scan_site(SITE, &CancellationToken::new())
        .await;

    assert_eq!(report.status, ScanStatus::Failed);
    assert!(report.error_message.unwrap().contains("Unauthorized"));
}

#[tokio::test]
async fn test_unknown_site_fails_scan() {
    let store = Arc::new(MemoryStore::new());
    let report = orchestrator(store, Arc::new(ScanRegistry::new()))
        .scan_site(SITE, &CancellationToken::new())
        .await;

    assert_eq!(report.status, ScanStatus::Failed);
    assert!(report.error_message.is_some());
}

#[tokio::test]
async fn test_duplicates_across_drives_in_drive_order() {
    let store = Arc::new(MemoryStore::new());
    let site = store.add_site(SITE);
    let first = store.add_drive(&site, "Documents");
    let second = store.add_drive(&site, "Archive");
    let third = store.add_drive(&site, "Projects");
    store.add_file(&first, ROOT_ID, "one.docx", 100, Hashes::quick_xor("D"));
    store.add_file(&second, ROOT_ID, "two.docx", 100, Hashes::quick_xor("D"));
    store.add_file(&third, ROOT_ID, "three.docx", 100, Hashes::quick_xor("D"));

    let config = ScannerConfig::builder()
        .drive_concurrency(3usize)
        .build()
        .unwrap();
    let orchestrator = ScanOrchestrator::new(store, Arc::new(ScanRegistry::new()), config);
    let report = orchestrator.scan_site(SITE, &CancellationToken::new()).await;

    let group = &report.duplicate_groups[0];
    let drives: Vec<_> = group.files.iter().map(|f| f.drive_id.as_str()).collect();
    assert_eq!(drives, vec![first.as_str(), second.as_str(), third.as_str()]);
    assert_eq!(report.total_space_wasted, 200);
}

#[tokio::test]
async fn test_failed_subtree_does_not_fail_scan() {
    let store = Arc::new(MemoryStore::new());
    let site = store.add_site(SITE);
    let drive = store.add_drive(&site, "Documents");
    let locked = store.add_folder(&drive, ROOT_ID, "locked");
    store.add_file(&drive, &locked, "secret.txt", 1, Hashes::quick_xor("s"));
    store.add_file(&drive, ROOT_ID, "open.txt", 1, Hashes::quick_xor("o"));
    store.fail_list(&locked, ErrorKind::Unauthorized);

    let report = orchestrator(store, Arc::new(ScanRegistry::new()))
        .scan_site(SITE, &CancellationToken::new())
        .await;

    assert_eq!(report.status, ScanStatus::Completed);
    assert_eq!(report.total_files_scanned, 1);
}

//! Lazy depth-first traversal of one drive.

use std::collections::VecDeque;

use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use spdedupe_core::{FileDescriptor, RemoteError, path};
use spdedupe_graph::{DriveItem, RemoteStore, ROOT_ID};

use crate::pager::ChildPager;

/// Counters collected while walking a drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnumerationStats {
    /// Folders whose listing was started.
    pub directories_listed: u64,
    /// Folders abandoned after a listing error.
    pub directories_skipped: u64,
    /// Pages fetched, empty ones included.
    pub pages_fetched: u64,
    pub files_emitted: u64,
    /// Folders whose listing stopped at the page cap.
    pub directories_capped: u64,
}

impl EnumerationStats {
    /// Add another drive's counters.
    pub fn merge(&mut self, other: &EnumerationStats) {
        self.directories_listed += other.directories_listed;
        self.directories_skipped += other.directories_skipped;
        self.pages_fetched += other.pages_fetched;
        self.files_emitted += other.files_emitted;
        self.directories_capped += other.directories_capped;
    }
}

/// The folder currently being listed.
struct OpenDirectory<'a, S: RemoteStore + ?Sized> {
    pager: ChildPager<'a, S>,
    /// Pages that contained at least one item.
    pages: u32,
    /// Consecutive pages without items.
    empty_pages: u32,
    /// Subfolders found so far, in listing order.
    subfolders: Vec<String>,
}

/// Produces the files of one drive, one at a time.
///
/// Folders are walked depth first; a folder's own files come before its
/// subfolders, and siblings keep their listing order. A listing error skips
/// the rest of that folder. Only cancellation is reported to the caller.
pub struct DriveEnumerator<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
    site_id: &'a str,
    drive_id: &'a str,
    max_pages: u32,
    cancel: CancellationToken,
    worklist: Vec<String>,
    current: Option<OpenDirectory<'a, S>>,
    pending: VecDeque<FileDescriptor>,
    stats: EnumerationStats,
}

impl<'a, S: RemoteStore + ?Sized> DriveEnumerator<'a, S> {
    pub fn new(
        store: &'a S,
        site_id: &'a str,
        drive_id: &'a str,
        max_pages: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            site_id,
            drive_id,
            max_pages: max_pages.max(1),
            cancel,
            worklist: vec![ROOT_ID.to_string()],
            current: None,
            pending: VecDeque::new(),
            stats: EnumerationStats::default(),
        }
    }

    pub fn stats(&self) -> EnumerationStats {
        self.stats
    }

    /// The next file of the drive, `None` once the walk is complete.
    pub async fn next_file(&mut self) -> Result<Option<FileDescriptor>, RemoteError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(RemoteError::Cancelled);
            }

            if let Some(file) = self.pending.pop_front() {
                self.stats.files_emitted += 1;
                return Ok(Some(file));
            }

            let mut dir = match self.current.take() {
                Some(dir) => dir,
                None => match self.worklist.pop() {
                    Some(item_id) => {
                        self.stats.directories_listed += 1;
                        OpenDirectory {
                            pager: ChildPager::new(self.store, self.drive_id, item_id),
                            pages: 0,
                            empty_pages: 0,
                            subfolders: Vec::new(),
                        }
                    }
                    None => return Ok(None),
                },
            };

            match dir.pager.next_page(&self.cancel).await {
                Ok(Some(items)) => {
                    self.stats.pages_fetched += 1;
                    if items.is_empty() {
                        dir.empty_pages += 1;
                    } else {
                        dir.pages += 1;
                        dir.empty_pages = 0;
                        self.absorb(items, &mut dir.subfolders);
                    }

                    if !dir.pager.has_more() {
                        self.close(dir);
                    } else if dir.pages >= self.max_pages || dir.empty_pages >= self.max_pages {
                        warn!(
                            drive_id = self.drive_id,
                            item_id = dir.pager.item_id(),
                            max_pages = self.max_pages,
                            "Reached maximum page limit, listing stopped"
                        );
                        self.stats.directories_capped += 1;
                        self.close(dir);
                    } else {
                        self.current = Some(dir);
                    }
                }
                Ok(None) => self.close(dir),
                Err(RemoteError::Cancelled) => return Err(RemoteError::Cancelled),
                Err(err) => {
                    warn!(
                        drive_id = self.drive_id,
                        item_id = dir.pager.item_id(),
                        error = %err,
                        "Error listing folder, skipping subtree"
                    );
                    self.stats.directories_skipped += 1;
                }
            }
        }
    }

    /// Turn the enumerator into a stream of files. The stream ends after the
    /// first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<FileDescriptor, RemoteError>> + 'a
    where
        S: 'a,
    {
        futures::stream::unfold(Some(self), |state| async move {
            let mut enumerator = state?;
            match enumerator.next_file().await {
                Ok(Some(file)) => Some((Ok(file), Some(enumerator))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    /// Queue a folder's subfolders so the first one is walked next.
    fn close(&mut self, dir: OpenDirectory<'a, S>) {
        debug!(
            drive_id = self.drive_id,
            item_id = dir.pager.item_id(),
            pages = dir.pages,
            subfolders = dir.subfolders.len(),
            "Folder listed"
        );
        self.worklist.extend(dir.subfolders.into_iter().rev());
    }

    fn absorb(&mut self, items: Vec<DriveItem>, subfolders: &mut Vec<String>) {
        for item in items {
            if item.is_folder() {
                if let Some(id) = item.id {
                    subfolders.push(id);
                }
            } else if let Some(file) = self.describe(item) {
                self.pending.push_back(file);
            }
        }
    }

    /// Build a descriptor for a file item that has an id and a size.
    fn describe(&self, item: DriveItem) -> Option<FileDescriptor> {
        if !item.is_file() {
            return None;
        }
        let (hash_algorithm, hash) = match item.preferred_hash() {
            Some((algorithm, digest)) => (Some(algorithm), digest.to_string()),
            None => (None, String::new()),
        };
        let id = item.id?;
        let size = item.size?;
        let name = item.name.unwrap_or_default();
        let parent_path = item.parent_reference.and_then(|p| p.path);

        Some(FileDescriptor {
            id,
            path: path::logical_path(parent_path.as_deref(), &name),
            name,
            size,
            hash,
            hash_algorithm,
            last_modified: item.last_modified,
            web_url: item.web_url.unwrap_or_default(),
            site_id: self.site_id.to_string(),
            drive_id: self.drive_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use spdedupe_core::{ErrorKind, HashAlgorithm};
    use spdedupe_graph::{FileFacet, Hashes, MemoryStore, ParentReference, StoreOp};

    fn setup() -> (MemoryStore, String, String) {
        let store = MemoryStore::new();
        let site = store.add_site("https://contoso.sharepoint.com/sites/team");
        let drive = store.add_drive(&site, "Documents");
        (store, site, drive)
    }

    async fn collect(enumerator: &mut DriveEnumerator<'_, MemoryStore>) -> Vec<FileDescriptor> {
        let mut files = Vec::new();
        while let Some(file) = enumerator.next_file().await.unwrap() {
            files.push(file);
        }
        files
    }

    #[tokio::test]
    async fn test_depth_first_order_and_paths() {
        let (store, site, drive) = setup();
        let a = store.add_folder(&drive, ROOT_ID, "a");
        store.add_file(&drive, ROOT_ID, "top.txt", 1, Hashes::quick_xor("t"));
        store.add_file(&drive, &a, "inner.txt", 2, Hashes::sha1("i"));
        let b = store.add_folder(&drive, &a, "b");
        store.add_file(&drive, &b, "deep.txt", 3, Hashes::default());
        let c = store.add_folder(&drive, ROOT_ID, "c");
        store.add_file(&drive, &c, "last.txt", 4, Hashes::crc32("l"));

        let mut enumerator = DriveEnumerator::new(&store, &site, &drive, 10, CancellationToken::new());
        let files = collect(&mut enumerator).await;
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/top.txt", "/a/inner.txt", "/a/b/deep.txt", "/c/last.txt"]);

        assert_eq!(files[1].hash_algorithm, Some(HashAlgorithm::Sha1));
        assert_eq!(files[2].hash, "");
        assert_eq!(files[2].hash_algorithm, None);
        assert_eq!(files[3].site_id, site);
        assert_eq!(files[3].drive_id, drive);

        let stats = enumerator.stats();
        assert_eq!(stats.directories_listed, 4);
        assert_eq!(stats.files_emitted, 4);
    }

    #[tokio::test]
    async fn test_items_without_id_or_size_are_ignored() {
        let (store, site, drive) = setup();
        store.push_raw_child(
            &drive,
            ROOT_ID,
            DriveItem {
                id: Some("no-size".into()),
                name: Some("x.txt".into()),
                file: Some(FileFacet::default()),
                ..Default::default()
            },
        );
        store.push_raw_child(
            &drive,
            ROOT_ID,
            DriveItem {
                id: Some("neither".into()),
                name: Some("package".into()),
                size: Some(5),
                ..Default::default()
            },
        );
        store.add_file(&drive, ROOT_ID, "ok.txt", 1, Hashes::quick_xor("q"));

        let mut enumerator = DriveEnumerator::new(&store, &site, &drive, 10, CancellationToken::new());
        let files = collect(&mut enumerator).await;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "ok.txt");
    }

    #[tokio::test]
    async fn test_parent_path_variants() {
        let (store, site, drive) = setup();
        let mut item = DriveItem {
            id: Some("x".into()),
            name: Some("x.txt".into()),
            size: Some(1),
            file: Some(FileFacet::default()),
            parent_reference: Some(ParentReference {
                drive_id: None,
                id: None,
                path: Some("/drives/b!abc/root:/Reports".into()),
            }),
            ..Default::default()
        };
        store.push_raw_child(&drive, ROOT_ID, item.clone());

        item.id = Some("y".into());
        item.name = Some("y.txt".into());
        item.parent_reference = Some(ParentReference::default());
        store.push_raw_child(&drive, ROOT_ID, item);

        let mut enumerator = DriveEnumerator::new(&store, &site, &drive, 10, CancellationToken::new());
        let files = collect(&mut enumerator).await;
        assert_eq!(files[0].path, "/Reports/x.txt");
        assert_eq!(files[1].path, "y.txt");
    }

    #[tokio::test]
    async fn test_failed_folder_is_skipped() {
        let (store, site, drive) = setup();
        let bad = store.add_folder(&drive, ROOT_ID, "bad");
        store.add_file(&drive, &bad, "hidden.txt", 1, Hashes::quick_xor("h"));
        let good = store.add_folder(&drive, ROOT_ID, "good");
        store.add_file(&drive, &good, "seen.txt", 1, Hashes::quick_xor("s"));
        store.fail_list(&bad, ErrorKind::Transport);

        let mut enumerator = DriveEnumerator::new(&store, &site, &drive, 10, CancellationToken::new());
        let files = collect(&mut enumerator).await;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "/good/seen.txt");
        assert_eq!(enumerator.stats().directories_skipped, 1);
    }

    #[tokio::test]
    async fn test_page_cap_bounds_looping_cursor() {
        let store = MemoryStore::new().with_page_size(1).with_looping_pagination();
        let site = store.add_site("https://contoso.sharepoint.com");
        let drive = store.add_drive(&site, "Documents");
        store.add_file(&drive, ROOT_ID, "loop.txt", 1, Hashes::quick_xor("l"));

        let mut enumerator = DriveEnumerator::new(&store, &site, &drive, 5, CancellationToken::new());
        let files = collect(&mut enumerator).await;

        assert_eq!(files.len(), 5);
        assert_eq!(store.call_count(StoreOp::ListChildren), 5);
        assert_eq!(enumerator.stats().directories_capped, 1);
    }

    #[tokio::test]
    async fn test_empty_looping_cursor_terminates() {
        let store = MemoryStore::new().with_looping_pagination();
        let site = store.add_site("https://contoso.sharepoint.com");
        let drive = store.add_drive(&site, "Documents");

        let mut enumerator = DriveEnumerator::new(&store, &site, &drive, 3, CancellationToken::new());
        assert!(collect(&mut enumerator).await.is_empty());
        assert_eq!(store.call_count(StoreOp::ListChildren), 3);
    }

    #[tokio::test]
    async fn test_cancellation_is_surfaced() {
        let (store, site, drive) = setup();
        store.add_file(&drive, ROOT_ID, "a.txt", 1, Hashes::quick_xor("a"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut enumerator = DriveEnumerator::new(&store, &site, &drive, 10, cancel);
        assert!(matches!(enumerator.next_file().await, Err(RemoteError::Cancelled)));
    }

    #[tokio::test]
    async fn test_stream_yields_all_files() {
        let (store, site, drive) = setup();
        for i in 0..3 {
            store.add_file(&drive, ROOT_ID, &format!("{i}.txt"), 1, Hashes::quick_xor("h"));
        }

        let enumerator = DriveEnumerator::new(&store, &site, &drive, 10, CancellationToken::new());
        let files: Vec<_> = enumerator.into_stream().collect().await;
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| f.is_ok()));
    }
}

//! Page-at-a-time cursor over the children of one folder.

use tokio_util::sync::CancellationToken;

use spdedupe_core::RemoteError;
use spdedupe_graph::{DriveItem, PageToken, RemoteStore};

/// Yields the children of one folder a page at a time.
///
/// The pager itself never stops early; page limits are the caller's business.
pub struct ChildPager<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
    drive_id: &'a str,
    item_id: String,
    next: Option<PageToken>,
    started: bool,
}

impl<'a, S: RemoteStore + ?Sized> ChildPager<'a, S> {
    pub fn new(store: &'a S, drive_id: &'a str, item_id: impl Into<String>) -> Self {
        Self {
            store,
            drive_id,
            item_id: item_id.into(),
            next: None,
            started: false,
        }
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    /// Whether another page may follow.
    pub fn has_more(&self) -> bool {
        !self.started || self.next.is_some()
    }

    /// Fetch the next page, `None` once the listing is exhausted.
    pub async fn next_page(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<DriveItem>>, RemoteError> {
        if !self.has_more() {
            return Ok(None);
        }

        let page = self
            .store
            .list_children(self.drive_id, &self.item_id, self.next.as_ref(), cancel)
            .await?;
        self.started = true;
        self.next = page.next_page;
        Ok(Some(page.items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spdedupe_graph::{Hashes, MemoryStore, ROOT_ID};

    #[tokio::test]
    async fn test_pager_walks_all_pages() {
        let store = MemoryStore::new().with_page_size(2);
        let site = store.add_site("https://contoso.sharepoint.com");
        let drive = store.add_drive(&site, "Documents");
        for i in 0..3 {
            store.add_file(&drive, ROOT_ID, &format!("{i}.txt"), 1, Hashes::default());
        }

        let cancel = CancellationToken::new();
        let mut pager = ChildPager::new(&store, &drive, ROOT_ID);
        assert!(pager.has_more());

        let first = pager.next_page(&cancel).await.unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert!(pager.has_more());

        let second = pager.next_page(&cancel).await.unwrap().unwrap();
        assert_eq!(second.len(), 1);
        assert!(!pager.has_more());

        assert!(pager.next_page(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_folder_yields_one_empty_page() {
        let store = MemoryStore::new();
        let site = store.add_site("https://contoso.sharepoint.com");
        let drive = store.add_drive(&site, "Documents");

        let cancel = CancellationToken::new();
        let mut pager = ChildPager::new(&store, &drive, ROOT_ID);
        assert_eq!(pager.next_page(&cancel).await.unwrap(), Some(vec![]));
        assert!(pager.next_page(&cancel).await.unwrap().is_none());
    }
}

//! The capability set upper layers consume.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use spdedupe_core::RemoteError;

use crate::types::{ChildrenPage, DriveItem, DriveRef, PageToken, SiteAddress};

/// Id that addresses the root folder of every drive.
pub const ROOT_ID: &str = "root";

/// A remote hierarchical file store organised as sites, drives and items.
///
/// Paths passed to [`upload_content`](RemoteStore::upload_content) and
/// [`get_item_by_path`](RemoteStore::get_item_by_path) are relative to the
/// drive root, forward-slash separated, without a leading slash.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Resolve a site to its id.
    async fn resolve_site(
        &self,
        site: &SiteAddress,
        cancel: &CancellationToken,
    ) -> Result<String, RemoteError>;

    /// List the drives of a site. Only drives with a non-empty id are returned.
    async fn list_drives(
        &self,
        site_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<DriveRef>, RemoteError>;

    /// Fetch one page of children. `item_id = "root"` denotes the drive root.
    async fn list_children(
        &self,
        drive_id: &str,
        item_id: &str,
        page: Option<&PageToken>,
        cancel: &CancellationToken,
    ) -> Result<ChildrenPage, RemoteError>;

    /// Create or overwrite a file at `path`.
    async fn upload_content(
        &self,
        drive_id: &str,
        path: &str,
        content: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError>;

    /// Delete an item by id.
    async fn delete_item(
        &self,
        drive_id: &str,
        item_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError>;

    /// Fetch item metadata by path, `None` if nothing exists there.
    async fn get_item_by_path(
        &self,
        drive_id: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DriveItem>, RemoteError>;
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    async fn resolve_site(
        &self,
        site: &SiteAddress,
        cancel: &CancellationToken,
    ) -> Result<String, RemoteError> {
        (**self).resolve_site(site, cancel).await
    }

    async fn list_drives(
        &self,
        site_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<DriveRef>, RemoteError> {
        (**self).list_drives(site_id, cancel).await
    }

    async fn list_children(
        &self,
        drive_id: &str,
        item_id: &str,
        page: Option<&PageToken>,
        cancel: &CancellationToken,
    ) -> Result<ChildrenPage, RemoteError> {
        (**self).list_children(drive_id, item_id, page, cancel).await
    }

    async fn upload_content(
        &self,
        drive_id: &str,
        path: &str,
        content: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        (**self).upload_content(drive_id, path, content, cancel).await
    }

    async fn delete_item(
        &self,
        drive_id: &str,
        item_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        (**self).delete_item(drive_id, item_id, cancel).await
    }

    async fn get_item_by_path(
        &self,
        drive_id: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DriveItem>, RemoteError> {
        (**self).get_item_by_path(drive_id, path, cancel).await
    }
}

//! In-memory [`RemoteStore`] for tests.
//!
//! The store keeps a tree of items per drive, pages listings with a
//! configurable page size, records every call it receives and can be told to
//! fail specific operations with a given [`ErrorKind`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use spdedupe_core::{ErrorKind, RemoteError, path};

use crate::store::{ROOT_ID, RemoteStore};
use crate::types::{
    ChildrenPage, DriveItem, DriveRef, FileFacet, FolderFacet, Hashes, PageToken, ParentReference,
    SiteAddress,
};

/// An operation of the store, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ResolveSite,
    ListDrives,
    ListChildren,
    Upload,
    Delete,
    GetByPath,
}

/// A call received by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    ResolveSite { site: String },
    ListDrives { site_id: String },
    ListChildren {
        drive_id: String,
        item_id: String,
        page: Option<String>,
    },
    Upload { drive_id: String, path: String },
    Delete { drive_id: String, item_id: String },
    GetByPath { drive_id: String, path: String },
}

impl StoreCall {
    pub fn op(&self) -> StoreOp {
        match self {
            Self::ResolveSite { .. } => StoreOp::ResolveSite,
            Self::ListDrives { .. } => StoreOp::ListDrives,
            Self::ListChildren { .. } => StoreOp::ListChildren,
            Self::Upload { .. } => StoreOp::Upload,
            Self::Delete { .. } => StoreOp::Delete,
            Self::GetByPath { .. } => StoreOp::GetByPath,
        }
    }

    /// The id or path the call addresses, if any.
    fn target(&self) -> Option<&str> {
        match self {
            Self::ResolveSite { .. } | Self::ListDrives { .. } => None,
            Self::ListChildren { item_id, .. } | Self::Delete { item_id, .. } => Some(item_id),
            Self::Upload { path, .. } | Self::GetByPath { path, .. } => Some(path),
        }
    }
}

type CallHook = Arc<dyn Fn(&StoreCall) + Send + Sync>;

#[derive(Debug, Clone)]
struct Failure {
    op: StoreOp,
    target: Option<String>,
    kind: ErrorKind,
}

impl Failure {
    fn matches(&self, call: &StoreCall) -> bool {
        self.op == call.op()
            && self
                .target
                .as_deref()
                .is_none_or(|t| call.target() == Some(t))
    }
}

#[derive(Debug, Clone)]
struct Node {
    item: DriveItem,
    /// Drive-relative path without a leading slash; empty for the root.
    path: String,
}

#[derive(Debug, Default)]
struct DriveState {
    nodes: HashMap<String, Node>,
    children: HashMap<String, Vec<String>>,
    by_path: HashMap<String, String>,
    content: HashMap<String, Vec<u8>>,
}

impl DriveState {
    fn new() -> Self {
        let mut state = Self::default();
        state.nodes.insert(
            ROOT_ID.to_string(),
            Node {
                item: DriveItem {
                    id: Some(ROOT_ID.to_string()),
                    name: Some("root".to_string()),
                    folder: Some(FolderFacet::default()),
                    ..Default::default()
                },
                path: String::new(),
            },
        );
        state.by_path.insert(String::new(), ROOT_ID.to_string());
        state
    }

    fn insert(&mut self, drive_id: &str, parent_id: &str, mut item: DriveItem, id: String) -> Option<String> {
        let parent_path = self.nodes.get(parent_id)?.path.clone();
        let name = item.name.clone().unwrap_or_default();
        let node_path = path::join(&parent_path, &name);

        item.id.get_or_insert_with(|| id.clone());
        item.parent_reference.get_or_insert_with(|| ParentReference {
            drive_id: Some(drive_id.to_string()),
            id: Some(parent_id.to_string()),
            path: Some(parent_reference_path(&parent_path)),
        });
        item.web_url
            .get_or_insert_with(|| format!("https://memory.invalid/{drive_id}/{node_path}"));

        let id = item.id.clone().unwrap_or(id);
        if !name.is_empty() {
            self.by_path.insert(node_path.clone(), id.clone());
        }
        self.children
            .entry(parent_id.to_string())
            .or_default()
            .push(id.clone());
        self.nodes.insert(id.clone(), Node { item, path: node_path });
        Some(id)
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(node) = self.nodes.remove(id) else {
            return false;
        };
        if self.by_path.get(&node.path).map(String::as_str) == Some(id) {
            self.by_path.remove(&node.path);
        }
        self.content.remove(&node.path);
        for siblings in self.children.values_mut() {
            siblings.retain(|c| c != id);
        }
        if let Some(children) = self.children.remove(id) {
            for child in children {
                self.remove(&child);
            }
        }
        true
    }
}

fn parent_reference_path(parent_path: &str) -> String {
    if parent_path.is_empty() {
        "/drive/root:".to_string()
    } else {
        format!("/drive/root:/{parent_path}")
    }
}

#[derive(Default)]
struct State {
    sites: HashMap<String, String>,
    drives: HashMap<String, Vec<DriveRef>>,
    drive_state: HashMap<String, DriveState>,
    failures: Vec<Failure>,
    calls: Vec<StoreCall>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn drive(&mut self, drive_id: &str) -> Result<&mut DriveState, RemoteError> {
        self.drive_state
            .get_mut(drive_id)
            .ok_or_else(|| RemoteError::NotFound {
                resource: format!("drive {drive_id}"),
            })
    }
}

/// A fully in-memory remote store.
pub struct MemoryStore {
    state: Mutex<State>,
    page_size: usize,
    loop_pagination: bool,
    hook: Option<CallHook>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("page_size", &self.page_size)
            .field("loop_pagination", &self.loop_pagination)
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: 200,
            loop_pagination: false,
            hook: None,
        }
    }

    /// Items per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make every listing return a continuation cursor that restarts at the
    /// first page, so pagination never terminates on its own.
    pub fn with_looping_pagination(mut self) -> Self {
        self.loop_pagination = true;
        self
    }

    /// Invoke `hook` for every call, before the call is served.
    pub fn with_call_hook(mut self, hook: impl Fn(&StoreCall) + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a site, returning its id.
    pub fn add_site(&self, site_url: &str) -> String {
        let key = SiteAddress::parse(site_url)
            .map(|s| s.to_string())
            .unwrap_or_else(|| site_url.to_string());
        let mut state = self.state();
        let id = state.next_id("site");
        state.sites.insert(key, id.clone());
        state.drives.entry(id.clone()).or_default();
        id
    }

    /// Add an empty drive to a site, returning its id.
    pub fn add_drive(&self, site_id: &str, name: &str) -> String {
        let id = self.state().next_id("drive");
        self.add_drive_with_id(site_id, &id, name);
        id
    }

    /// Add a drive with a caller-chosen id. An empty id is listed by nobody.
    pub fn add_drive_with_id(&self, site_id: &str, drive_id: &str, name: &str) {
        let mut state = self.state();
        state
            .drives
            .entry(site_id.to_string())
            .or_default()
            .push(DriveRef {
                id: drive_id.to_string(),
                name: name.to_string(),
            });
        if !drive_id.is_empty() {
            state
                .drive_state
                .entry(drive_id.to_string())
                .or_insert_with(DriveState::new);
        }
    }

    /// Add a folder under `parent_id`, returning its id.
    pub fn add_folder(&self, drive_id: &str, parent_id: &str, name: &str) -> String {
        self.push_item(
            drive_id,
            parent_id,
            DriveItem {
                name: Some(name.to_string()),
                folder: Some(FolderFacet::default()),
                ..Default::default()
            },
        )
    }

    /// Add a file under `parent_id`, returning its id.
    pub fn add_file(
        &self,
        drive_id: &str,
        parent_id: &str,
        name: &str,
        size: u64,
        hashes: Hashes,
    ) -> String {
        self.push_item(
            drive_id,
            parent_id,
            DriveItem {
                name: Some(name.to_string()),
                size: Some(size),
                file: Some(FileFacet {
                    mime_type: None,
                    hashes: Some(hashes),
                }),
                ..Default::default()
            },
        )
    }

    /// Add an item exactly as given, filling in only the id, web URL and
    /// parent reference when they are absent.
    pub fn push_raw_child(&self, drive_id: &str, parent_id: &str, item: DriveItem) -> String {
        self.push_item(drive_id, parent_id, item)
    }

    fn push_item(&self, drive_id: &str, parent_id: &str, item: DriveItem) -> String {
        let mut state = self.state();
        let id = state.next_id("item");
        state
            .drive_state
            .get_mut(drive_id)
            .and_then(|drive| drive.insert(drive_id, parent_id, item, id.clone()))
            .unwrap_or(id)
    }

    /// Fail every matching call with an error of `kind`. `target` narrows the
    /// failure to an item id (list, delete) or a drive path (upload, get).
    pub fn inject_failure(&self, op: StoreOp, target: Option<&str>, kind: ErrorKind) {
        let target = target.map(|t| match op {
            StoreOp::Upload | StoreOp::GetByPath => path::normalize_dir(t),
            _ => t.to_string(),
        });
        self.state().failures.push(Failure { op, target, kind });
    }

    pub fn fail_upload(&self, path: &str, kind: ErrorKind) {
        self.inject_failure(StoreOp::Upload, Some(path), kind);
    }

    pub fn fail_delete(&self, item_id: &str, kind: ErrorKind) {
        self.inject_failure(StoreOp::Delete, Some(item_id), kind);
    }

    pub fn fail_list(&self, item_id: &str, kind: ErrorKind) {
        self.inject_failure(StoreOp::ListChildren, Some(item_id), kind);
    }

    pub fn fail_get_by_path(&self, path: &str, kind: ErrorKind) {
        self.inject_failure(StoreOp::GetByPath, Some(path), kind);
    }

    pub fn fail_resolve(&self, kind: ErrorKind) {
        self.inject_failure(StoreOp::ResolveSite, None, kind);
    }

    pub fn fail_list_drives(&self, kind: ErrorKind) {
        self.inject_failure(StoreOp::ListDrives, None, kind);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    /// Number of calls of the given operation.
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.state().calls.iter().filter(|c| c.op() == op).count()
    }

    /// Uploaded content at `path`, decoded as UTF-8.
    pub fn content(&self, drive_id: &str, path: &str) -> Option<String> {
        let state = self.state();
        let bytes = state
            .drive_state
            .get(drive_id)?
            .content
            .get(&path::normalize_dir(path))?;
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Whether an item exists at `path`.
    pub fn exists(&self, drive_id: &str, path: &str) -> bool {
        self.state()
            .drive_state
            .get(drive_id)
            .is_some_and(|d| d.by_path.contains_key(&path::normalize_dir(path)))
    }

    /// Whether an item with `item_id` exists.
    pub fn contains_item(&self, drive_id: &str, item_id: &str) -> bool {
        self.state()
            .drive_state
            .get(drive_id)
            .is_some_and(|d| d.nodes.contains_key(item_id))
    }

    /// Remove an item behind the caller's back, e.g. to break a shortcut.
    pub fn remove_path(&self, drive_id: &str, path: &str) -> bool {
        let mut state = self.state();
        let Some(drive) = state.drive_state.get_mut(drive_id) else {
            return false;
        };
        match drive.by_path.get(&path::normalize_dir(path)).cloned() {
            Some(id) => drive.remove(&id),
            None => false,
        }
    }

    /// Record the call, run the hook and apply cancellation and injected
    /// failures.
    fn begin(&self, call: StoreCall, cancel: &CancellationToken) -> Result<(), RemoteError> {
        self.state().calls.push(call.clone());
        if let Some(hook) = &self.hook {
            hook(&call);
        }
        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }

        let failure = self
            .state()
            .failures
            .iter()
            .find(|f| f.matches(&call))
            .map(|f| f.kind);
        match failure {
            Some(kind) => Err(injected_error(kind, &call)),
            None => Ok(()),
        }
    }
}

fn injected_error(kind: ErrorKind, call: &StoreCall) -> RemoteError {
    let target = call.target().unwrap_or_default().to_string();
    match kind {
        ErrorKind::Unauthorized => RemoteError::Unauthorized {
            message: "Access denied".to_string(),
        },
        ErrorKind::NotFound => RemoteError::NotFound { resource: target },
        ErrorKind::Transport => RemoteError::Transport {
            message: "503 Service Unavailable".to_string(),
            status: Some(503),
            retry_after: None,
        },
        ErrorKind::RemoteApi => RemoteError::RemoteApi {
            status: 400,
            code: "invalidRequest".to_string(),
            message: format!("Request for '{target}' was rejected"),
        },
        ErrorKind::Io => RemoteError::Io {
            source: std::io::Error::other("connection reset"),
        },
        ErrorKind::Cancelled => RemoteError::Cancelled,
        ErrorKind::InvalidInput | ErrorKind::Unexpected => {
            RemoteError::unexpected(format!("Injected failure for '{target}'"))
        }
    }
}

/// Cursor format: `<item id>@<offset>`.
fn parse_cursor(token: &PageToken) -> Option<usize> {
    token.as_str().rsplit_once('@')?.1.parse().ok()
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn resolve_site(
        &self,
        site: &SiteAddress,
        cancel: &CancellationToken,
    ) -> Result<String, RemoteError> {
        let key = site.to_string();
        self.begin(StoreCall::ResolveSite { site: key.clone() }, cancel)?;
        self.state()
            .sites
            .get(&key)
            .cloned()
            .ok_or(RemoteError::NotFound { resource: key })
    }

    async fn list_drives(
        &self,
        site_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<DriveRef>, RemoteError> {
        self.begin(
            StoreCall::ListDrives {
                site_id: site_id.to_string(),
            },
            cancel,
        )?;
        let state = self.state();
        let drives = state.drives.get(site_id).ok_or_else(|| RemoteError::NotFound {
            resource: format!("site {site_id}"),
        })?;
        Ok(drives.iter().filter(|d| !d.id.is_empty()).cloned().collect())
    }

    async fn list_children(
        &self,
        drive_id: &str,
        item_id: &str,
        page: Option<&PageToken>,
        cancel: &CancellationToken,
    ) -> Result<ChildrenPage, RemoteError> {
        self.begin(
            StoreCall::ListChildren {
                drive_id: drive_id.to_string(),
                item_id: item_id.to_string(),
                page: page.map(|p| p.as_str().to_string()),
            },
            cancel,
        )?;

        let offset = match page {
            Some(token) => parse_cursor(token).ok_or_else(|| RemoteError::RemoteApi {
                status: 400,
                code: "invalidRequest".to_string(),
                message: format!("Invalid page token '{}'", token.as_str()),
            })?,
            None => 0,
        };

        let mut state = self.state();
        let drive = state.drive(drive_id)?;
        if !drive.nodes.contains_key(item_id) {
            return Err(RemoteError::NotFound {
                resource: format!("item {item_id}"),
            });
        }

        let ids = drive.children.get(item_id).cloned().unwrap_or_default();
        let end = (offset + self.page_size).min(ids.len());
        let items = ids
            .get(offset.min(end)..end)
            .unwrap_or_default()
            .iter()
            .filter_map(|id| drive.nodes.get(id).map(|n| n.item.clone()))
            .collect();

        let next_page = if self.loop_pagination {
            Some(PageToken(format!("{item_id}@0")))
        } else if end < ids.len() {
            Some(PageToken(format!("{item_id}@{end}")))
        } else {
            None
        };

        Ok(ChildrenPage { items, next_page })
    }

    async fn upload_content(
        &self,
        drive_id: &str,
        path: &str,
        content: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        let normalized = path::normalize_dir(path);
        self.begin(
            StoreCall::Upload {
                drive_id: drive_id.to_string(),
                path: normalized.clone(),
            },
            cancel,
        )?;
        if normalized.is_empty() {
            return Err(RemoteError::unexpected("Empty item path"));
        }

        let mut state = self.state();
        let (parent, name) = path::split_path(&normalized);
        let size = content.len() as u64;

        // Create missing parent folders, then the file itself.
        let parent_id = {
            let mut current = ROOT_ID.to_string();
            let mut current_path = String::new();
            for segment in parent.split('/').filter(|s| !s.is_empty()) {
                current_path = path::join(&current_path, segment);
                let existing = state.drive(drive_id)?.by_path.get(&current_path).cloned();
                current = match existing {
                    Some(id) => id,
                    None => {
                        let id = state.next_id("item");
                        let folder = DriveItem {
                            name: Some(segment.to_string()),
                            folder: Some(FolderFacet::default()),
                            ..Default::default()
                        };
                        let drive = state.drive(drive_id)?;
                        drive.insert(drive_id, &current, folder, id.clone());
                        id
                    }
                };
            }
            current
        };

        let existing = state.drive(drive_id)?.by_path.get(&normalized).cloned();
        match existing {
            Some(id) => {
                let drive = state.drive(drive_id)?;
                if let Some(node) = drive.nodes.get_mut(&id) {
                    node.item.size = Some(size);
                }
            }
            None => {
                let id = state.next_id("item");
                let file = DriveItem {
                    name: Some(name.to_string()),
                    size: Some(size),
                    file: Some(FileFacet {
                        mime_type: Some("text/plain".to_string()),
                        hashes: None,
                    }),
                    ..Default::default()
                };
                state.drive(drive_id)?.insert(drive_id, &parent_id, file, id);
            }
        }
        state.drive(drive_id)?.content.insert(normalized, content);
        Ok(())
    }

    async fn delete_item(
        &self,
        drive_id: &str,
        item_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        self.begin(
            StoreCall::Delete {
                drive_id: drive_id.to_string(),
                item_id: item_id.to_string(),
            },
            cancel,
        )?;
        let mut state = self.state();
        if state.drive(drive_id)?.remove(item_id) {
            Ok(())
        } else {
            Err(RemoteError::NotFound {
                resource: format!("item {item_id}"),
            })
        }
    }

    async fn get_item_by_path(
        &self,
        drive_id: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DriveItem>, RemoteError> {
        let normalized = path::normalize_dir(path);
        self.begin(
            StoreCall::GetByPath {
                drive_id: drive_id.to_string(),
                path: normalized.clone(),
            },
            cancel,
        )?;
        let mut state = self.state();
        let drive = state.drive(drive_id)?;
        Ok(drive
            .by_path
            .get(&normalized)
            .and_then(|id| drive.nodes.get(id))
            .map(|node| node.item.clone()))
    }
}

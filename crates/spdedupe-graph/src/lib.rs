//! Remote store access for spdedupe.
//!
//! [`RemoteStore`] is the narrow capability set the scanner and the shortcut
//! operations need: resolve a site, list its drives, page through folder
//! children, upload a small file, delete an item and look an item up by path.
//!
//! Two implementations are provided:
//!
//! - [`GraphClient`] talks to Microsoft Graph over HTTPS with bearer tokens
//!   from a [`CredentialProvider`], retrying throttled and failed requests.
//! - `MemoryStore` keeps everything in memory and supports failure
//!   injection, for tests. It is compiled only under `cfg(test)` or with the
//!   `test-util` feature.

mod auth;
mod client;
mod config;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
mod retry;
mod store;
mod types;

pub use auth::{ClientSecretCredential, CredentialProvider, StaticToken};
pub use client::GraphClient;
pub use config::GraphConfig;
#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryStore, StoreCall, StoreOp};
pub use retry::RetryPolicy;
pub use store::{ROOT_ID, RemoteStore};
pub use types::{
    ChildrenPage, DriveItem, DriveRef, FileFacet, FolderFacet, Hashes, PageToken, ParentReference,
    SiteAddress,
};

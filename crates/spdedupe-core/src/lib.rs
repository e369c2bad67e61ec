//! Core types and the scan registry for spdedupe.
//!
//! This crate provides the data model shared by every layer (file
//! descriptors, duplicate groups, scan reports, replacement and verification
//! results), the error taxonomy, scanner configuration and the process-wide
//! [`ScanRegistry`].

mod config;
mod error;
mod model;
pub mod path;
mod registry;

pub use config::{ScannerConfig, ScannerConfigBuilder};
pub use error::{DedupeError, ErrorKind, RemoteError};
pub use model::{
    BrokenShortcutDetail, ContentHash, DuplicateGroup, FileDescriptor, HashAlgorithm,
    ReplacementDetail, ReplacementRequest, ReplacementResult, ReplacementSelection, ScanReport,
    ScanStatus, ShortcutEntry, ShortcutManifest, VerificationResult,
};
pub use registry::ScanRegistry;

/// Message recorded on a scan report when the scan is cancelled.
pub const SCAN_CANCELLED_MESSAGE: &str = "Scan was cancelled";

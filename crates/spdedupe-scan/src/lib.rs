//! Drive enumeration and scan orchestration for spdedupe.
//!
//! `spdedupe-scan` walks every drive of a site through a
//! [`RemoteStore`](spdedupe_graph::RemoteStore), hands the discovered files to
//! the grouper and publishes the resulting report to the
//! [`ScanRegistry`](spdedupe_core::ScanRegistry). Key features:
//!
//! - **Lazy traversal** via [`DriveEnumerator`], one page at a time
//! - **Bounded pagination** per folder, guarding against cursor loops
//! - **Progress updates** via broadcast channels
//! - **Bounded fan-out** over drives that keeps grouping deterministic
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use spdedupe_core::{ScanRegistry, ScannerConfig};
//! use spdedupe_graph::MemoryStore;
//! use spdedupe_scan::ScanOrchestrator;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() {
//! let orchestrator = ScanOrchestrator::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(ScanRegistry::new()),
//!     ScannerConfig::default(),
//! );
//!
//! let mut progress_rx = orchestrator.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(progress) = progress_rx.recv().await {
//!         println!("Scanned {} files", progress.files_scanned);
//!     }
//! });
//!
//! let report = orchestrator
//!     .scan_site("https://contoso.sharepoint.com/sites/team", &CancellationToken::new())
//!     .await;
//! println!("{} duplicate groups", report.duplicate_groups.len());
//! # }
//! ```

mod enumerator;
mod orchestrator;
mod pager;
mod progress;

pub use enumerator::{DriveEnumerator, EnumerationStats};
pub use orchestrator::{NO_DRIVES_MESSAGE, ScanOrchestrator};
pub use pager::ChildPager;
pub use progress::{ScanPhase, ScanProgress};

// Re-export core types for convenience
pub use spdedupe_core::{FileDescriptor, SCAN_CANCELLED_MESSAGE, ScanReport, ScanStatus};

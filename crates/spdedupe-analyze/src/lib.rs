//! Analysis algorithms for spdedupe.
//!
//! The [`Grouper`] partitions scanned files into duplicate groups using the
//! content hashes the remote already computed; nothing is downloaded or
//! re-hashed.
//!
//! ```rust,ignore
//! use spdedupe_analyze::Grouper;
//!
//! let report = Grouper::new().group(files);
//!
//! println!("Found {} duplicate groups", report.group_count());
//! println!("Wasted space: {} bytes", report.total_wasted_space);
//! ```

mod grouper;

pub use grouper::{GroupReport, Grouper};

// Re-export core types
pub use spdedupe_core::{ContentHash, DuplicateGroup, FileDescriptor, HashAlgorithm};

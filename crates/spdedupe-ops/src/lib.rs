//! Shortcut replacement and verification for spdedupe.
//!
//! Once a scan has completed and the operator has picked a keep copy per
//! group, [`Replacer`] swaps every other member for an internet shortcut
//! pointing at the kept file and records it in the scan's manifest.
//! [`Verifier`] later checks that the recorded shortcuts still exist.

mod replacer;
mod shortcut;
mod verifier;

pub use replacer::Replacer;
pub use shortcut::{SHORTCUT_EXTENSION, ShortcutLocation, shortcut_body, shortcut_name};
pub use verifier::{SHORTCUT_MISSING_ISSUE, Verifier};

pub use spdedupe_core::{ReplacementRequest, ReplacementResult, VerificationResult};

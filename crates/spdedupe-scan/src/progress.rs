//! Scan progress reporting.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

/// Stage a scan is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// Resolving the site and listing its drives.
    Resolving,
    /// Walking drives.
    Enumerating,
    /// Building duplicate groups.
    Grouping,
    /// The scan reached a terminal state.
    Finished,
}

/// Progress information during a scan.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub scan_id: String,
    pub phase: ScanPhase,
    /// Number of files discovered so far.
    pub files_scanned: u64,
    pub drives_total: usize,
    pub drives_completed: usize,
    /// Drive that produced the latest update, if any.
    pub current_drive: Option<String>,
    /// Time elapsed since the scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Calculate scan rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Shared counters for one scan, safe to update from concurrent drive tasks.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    scan_id: String,
    start_time: Instant,
    files_scanned: AtomicU64,
    drives_total: AtomicUsize,
    drives_completed: AtomicUsize,
    tx: broadcast::Sender<ScanProgress>,
}

impl ProgressTracker {
    pub fn new(scan_id: impl Into<String>, tx: broadcast::Sender<ScanProgress>) -> Self {
        Self {
            scan_id: scan_id.into(),
            start_time: Instant::now(),
            files_scanned: AtomicU64::new(0),
            drives_total: AtomicUsize::new(0),
            drives_completed: AtomicUsize::new(0),
            tx,
        }
    }

    /// Count one file, returning the new total.
    pub fn record_file(&self) -> u64 {
        self.files_scanned.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn set_drives_total(&self, total: usize) {
        self.drives_total.store(total, Ordering::Relaxed);
    }

    pub fn record_drive_done(&self) {
        self.drives_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn files_scanned(&self) -> u64 {
        self.files_scanned.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, phase: ScanPhase, current_drive: Option<&str>) -> ScanProgress {
        ScanProgress {
            scan_id: self.scan_id.clone(),
            phase,
            files_scanned: self.files_scanned(),
            drives_total: self.drives_total.load(Ordering::Relaxed),
            drives_completed: self.drives_completed.load(Ordering::Relaxed),
            current_drive: current_drive.map(str::to_string),
            elapsed: self.start_time.elapsed(),
        }
    }

    /// Broadcast a snapshot. Having no subscribers is fine.
    pub fn publish(&self, phase: ScanPhase, current_drive: Option<&str>) {
        let _ = self.tx.send(self.snapshot(phase, current_drive));
    }
}

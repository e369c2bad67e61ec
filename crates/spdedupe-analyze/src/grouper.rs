//! Duplicate detection over upstream-provided content hashes.
//!
//! Files are bucketed by `(algorithm, digest)`; every bucket with two or more
//! members becomes a [`DuplicateGroup`]. Files without a hash never take part.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use spdedupe_core::{ContentHash, DuplicateGroup, FileDescriptor};

/// Results from grouping one scan's files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupReport {
    /// Groups sorted by wasted space descending, then hash, then algorithm.
    pub groups: Vec<DuplicateGroup>,

    /// Number of files handed to the grouper.
    pub files_analyzed: u64,

    /// Files skipped because the remote supplied no hash.
    pub files_without_hash: u64,

    /// Sum of member counts over all groups.
    pub duplicate_files: u64,

    /// Sum of wasted space over all groups.
    pub total_wasted_space: u64,
}

impl GroupReport {
    /// Check if any duplicates were found.
    pub fn has_duplicates(&self) -> bool {
        !self.groups.is_empty()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// Partitions file descriptors into duplicate groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct Grouper;

impl Grouper {
    pub fn new() -> Self {
        Self
    }

    /// Group `files`. Member order within a group is the input order.
    pub fn group(&self, files: Vec<FileDescriptor>) -> GroupReport {
        let files_analyzed = files.len() as u64;
        let mut files_without_hash = 0u64;

        let mut buckets: HashMap<ContentHash, Vec<FileDescriptor>> = HashMap::new();
        for file in files {
            match file.content_hash() {
                Some(key) => buckets.entry(key).or_default().push(file),
                None => files_without_hash += 1,
            }
        }

        let mut groups: Vec<DuplicateGroup> = buckets
            .into_iter()
            .filter(|(_, members)| members.len() >= 2)
            .map(|(key, members)| {
                check_sizes(&key, &members);
                DuplicateGroup::new(key, members)
            })
            .collect();

        groups.sort_by(|a, b| {
            b.total_wasted_space
                .cmp(&a.total_wasted_space)
                .then_with(|| a.hash.cmp(&b.hash))
                .then_with(|| a.hash_algorithm.cmp(&b.hash_algorithm))
        });

        let duplicate_files = groups.iter().map(|g| g.count() as u64).sum();
        let total_wasted_space = groups.iter().map(|g| g.total_wasted_space).sum();

        debug!(
            files_analyzed,
            files_without_hash,
            groups = groups.len(),
            "Grouped files by content hash"
        );

        GroupReport {
            groups,
            files_analyzed,
            files_without_hash,
            duplicate_files,
            total_wasted_space,
        }
    }
}

/// Members are trusted to share a size; log when the upstream disagrees.
fn check_sizes(key: &ContentHash, members: &[FileDescriptor]) {
    let Some(first) = members.first() else {
        return;
    };
    for other in members.iter().skip(1).filter(|f| f.size != first.size) {
        warn!(
            hash = %key,
            expected = first.size,
            actual = other.size,
            path = %other.path,
            "Duplicate group member size mismatch"
        );
    }
}

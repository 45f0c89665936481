//! Local and remote file entries
//!
//! `LocalEntry` comes from walking the local tree, `RemoteEntry` from the
//! store's folder listing. `ListingDiff` is the three-way partition the
//! sync engine works from.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{ContentDigest, RelativePath};

/// Listing entries with a `Mode` at or below this value are regular files
pub const MAX_FILE_MODE: u32 = 9999;

/// Suffix of the sibling file a download streams into before it is renamed
/// onto its destination. The local walk skips these files.
pub const PARTIAL_DOWNLOAD_SUFFIX: &str = ".weedsync-part";

/// Number of leading characters of a chunk mtime that hold epoch seconds
const MTIME_SECONDS_DIGITS: usize = 10;

// ============================================================================
// LocalEntry
// ============================================================================

/// A regular file found by the local directory walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    /// Path relative to the local base directory
    pub path: RelativePath,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: DateTime<Utc>,
}

/// Round a timestamp to the nearest whole second
#[must_use]
pub fn round_to_seconds(time: DateTime<Utc>) -> i64 {
    let millis = time.timestamp_millis();
    (millis as f64 / 1000.0).round() as i64
}

// ============================================================================
// RemoteEntry
// ============================================================================

/// One chunk of a stored object, as reported by the listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Base64 digest of the chunk's bytes
    pub e_tag: String,
    /// Modification time as the store renders it (epoch seconds followed by
    /// optional sub-second digits)
    pub mtime: String,
}

impl Chunk {
    /// Decoded chunk digest, `None` when the e_tag is not a base64 MD5
    #[must_use]
    pub fn digest(&self) -> Option<ContentDigest> {
        ContentDigest::from_base64(&self.e_tag).ok()
    }

    /// Epoch seconds taken from the first ten characters of the mtime
    ///
    /// Anything after the tenth character is ignored. Unparseable text
    /// yields 0.
    #[must_use]
    pub fn epoch_seconds(&self) -> i64 {
        let head: String = self.mtime.trim().chars().take(MTIME_SECONDS_DIGITS).collect();
        head.parse::<f64>().map(|v| v as i64).unwrap_or(0)
    }
}

/// A file or directory record from the store's folder listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Absolute path in the store, including the `/{username}/` root
    pub full_path: String,
    /// Numeric mode; at most [`MAX_FILE_MODE`] for regular files
    pub mode: u32,
    /// Size in bytes
    pub file_size: u64,
    /// Whole-file digest, `None` when the store reports it as unset
    pub md5: Option<ContentDigest>,
    /// The store's chunks of this object, in file order
    pub chunks: Vec<Chunk>,
}

impl RemoteEntry {
    /// Whether this entry is a regular file
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.mode <= MAX_FILE_MODE
    }

    /// Reference modification time used for direction decisions
    ///
    /// This is the first chunk's mtime in whole seconds, or 0 when the
    /// entry has no chunks.
    #[must_use]
    pub fn reference_mtime(&self) -> i64 {
        self.chunks.first().map_or(0, Chunk::epoch_seconds)
    }
}

// ============================================================================
// ListingDiff
// ============================================================================

/// Three-way partition of local and remote relative paths
///
/// The partitions are pairwise disjoint and together cover every path seen
/// on either side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingDiff {
    /// Present locally, absent remotely
    pub local_only: BTreeSet<RelativePath>,
    /// Present remotely, absent locally
    pub remote_only: BTreeSet<RelativePath>,
    /// Present on both sides, with the remote metadata attached
    pub both: Vec<(RelativePath, RemoteEntry)>,
}

impl ListingDiff {
    /// Whether there is nothing to reconcile
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.local_only.is_empty() && self.remote_only.is_empty() && self.both.is_empty()
    }

    /// Total number of distinct paths across all partitions
    #[must_use]
    pub fn total(&self) -> usize {
        self.local_only.len() + self.remote_only.len() + self.both.len()
    }
}

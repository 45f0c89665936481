//! Already-synced detection and direction choice
//!
//! A file present on both sides is considered in sync when its size matches
//! and either the whole-file digest matches the store's `Md5`, or (when the
//! store has no whole-file digest) every stored chunk digest matches the
//! corresponding local chunk. Otherwise modification times decide which
//! side wins.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use weedsync_core::domain::entry::round_to_seconds;
use weedsync_core::domain::{ContentDigest, RelativePath, RemoteEntry};
use weedsync_core::ports::IRemoteStore;

use crate::digest::{file_digests, whole_file_digest};

/// Seconds the local copy must be newer than the remote before it wins
pub const DIRECTION_SKEW_SECS: i64 = 50;

/// Which side's content replaces the other
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Upload => write!(f, "upload"),
            Direction::Download => write!(f, "download"),
        }
    }
}

/// Upload only when the local copy is more than [`DIRECTION_SKEW_SECS`]
/// newer; ties and small differences favour the store
#[must_use]
pub fn choose_direction(local_mtime: i64, remote_mtime: i64) -> Direction {
    if local_mtime > remote_mtime + DIRECTION_SKEW_SECS {
        Direction::Upload
    } else {
        Direction::Download
    }
}

/// Local modification time in whole seconds
pub async fn local_mtime(path: &Path) -> std::io::Result<i64> {
    let modified: DateTime<Utc> = tokio::fs::metadata(path).await?.modified()?.into();
    Ok(round_to_seconds(modified))
}

/// Compares a local file against its remote listing entry
pub struct FileComparator {
    store: Arc<dyn IRemoteStore>,
    chunk_size: usize,
}

impl FileComparator {
    pub fn new(store: Arc<dyn IRemoteStore>, chunk_size: usize) -> Self {
        Self { store, chunk_size }
    }

    /// Whether `local` already holds the stored content of `rel`
    ///
    /// On a match the lock tag is cleared and, if the store had no
    /// whole-file digest, the computed one is recorded.
    #[tracing::instrument(skip(self, local, remote), fields(path = %rel))]
    pub async fn is_already_synced(
        &self,
        local: &Path,
        rel: &RelativePath,
        remote: &RemoteEntry,
    ) -> anyhow::Result<bool> {
        let known = match remote.md5 {
            Some(digest) => Some(digest),
            None => self.lookup_content_hash(rel).await,
        };

        let local_size = tokio::fs::metadata(local).await?.len();
        if local_size != remote.file_size {
            debug!(local_size, remote_size = remote.file_size, "Sizes differ");
            return Ok(false);
        }

        let (matched, computed) = match known {
            Some(expected) => (whole_file_digest(local).await? == expected, None),
            None => {
                let digests = file_digests(local, self.chunk_size).await?;
                (chunks_match(&digests.chunks, remote), Some(digests.whole))
            }
        };

        if !matched {
            debug!("Content differs");
            return Ok(false);
        }

        if let Err(err) = self.store.remove_tags(rel).await {
            warn!(error = %err, "Failed to clear sync tags");
        }
        if let Some(whole) = computed {
            self.store.set_content_hash(rel, &whole).await?;
        }

        debug!("Already in sync");
        Ok(true)
    }

    async fn lookup_content_hash(&self, rel: &RelativePath) -> Option<ContentDigest> {
        match self.store.get_content_hash(rel).await {
            Ok(tag) => tag,
            Err(err) => {
                warn!(error = %err, "Content hash lookup failed");
                None
            }
        }
    }
}

/// Every stored chunk digest equals the local chunk at the same position
fn chunks_match(local: &[ContentDigest], remote: &RemoteEntry) -> bool {
    if local.len() != remote.chunks.len() {
        return false;
    }
    local
        .iter()
        .zip(&remote.chunks)
        .all(|(ours, theirs)| theirs.digest() == Some(*ours))
}

//! Remote store port (driven/secondary port)
//!
//! This module defines the interface the sync engine needs from the remote
//! file store: folder listings, whole-file transfers, extended-attribute
//! tags (content hash and lock), and the version-delta exchange used to
//! reconcile files present on both sides.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific.
//!   A store response with status >= 300 surfaces as an `Err`.
//! - Paths are [`RelativePath`]s; the adapter maps them into the user's
//!   remote namespace (`/{username}/...`).
//! - `set_lock` is expected to behave as set-if-absent on the store side.
//!   The engine reads the lock back to confirm ownership either way.

use std::path::{Path, PathBuf};

use crate::domain::newtypes::{ClientId, ContentDigest, RelativePath};
use crate::domain::RemoteEntry;

/// Extra query parameters passed through to a download request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadParams(Vec<(String, String)>);

impl DownloadParams {
    /// No extra parameters
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Request the metadata representation of an entry (`?meta=`), which is
    /// how version signatures (`<path>.sig.v`) are fetched
    #[must_use]
    pub fn meta() -> Self {
        Self(vec![("meta".to_string(), String::new())])
    }

    /// Add a parameter
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((key.into(), value.into()));
        self
    }

    /// Iterate over the parameters in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Remote file store operations
///
/// Implemented by `weedsync-filer` against a SeaweedFS filer and by
/// in-memory fakes in tests.
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// The account whose namespace (`/{username}/`) this store serves
    fn username(&self) -> &str;

    /// The identity this client writes into file locks
    fn client_id(&self) -> &ClientId;

    // ------------------------------------------------------------------
    // Listing and whole-file transfer
    // ------------------------------------------------------------------

    /// List the entries under `folder` (relative to the user root; an empty
    /// string lists the root). Directories are included; callers filter
    /// with [`RemoteEntry::is_file`].
    async fn list_folder(&self, folder: &str, recursive: bool)
        -> anyhow::Result<Vec<RemoteEntry>>;

    /// Upload the local file at `local` to `remote`
    async fn upload_file(&self, local: &Path, remote: &RelativePath) -> anyhow::Result<()>;

    /// Download `remote` (a relative path, possibly with a suffix such as
    /// `.sig.v`) into `dest_root`, preserving its relative layout
    ///
    /// Returns the path of the written file.
    async fn download_file(
        &self,
        remote: &str,
        dest_root: &Path,
        params: &DownloadParams,
    ) -> anyhow::Result<PathBuf>;

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    /// Read the content-hash tag, `None` when unset
    async fn get_content_hash(&self, remote: &RelativePath)
        -> anyhow::Result<Option<ContentDigest>>;

    /// Write the content-hash tag
    async fn set_content_hash(
        &self,
        remote: &RelativePath,
        digest: &ContentDigest,
    ) -> anyhow::Result<()>;

    /// Clear transient sync-state tags (the lock) from `remote`
    async fn remove_tags(&self, remote: &RelativePath) -> anyhow::Result<()>;

    // ------------------------------------------------------------------
    // Locks
    // ------------------------------------------------------------------

    /// Read the current lock owner, `None` when the file is unlocked
    async fn get_lock(&self, remote: &RelativePath) -> anyhow::Result<Option<String>>;

    /// Request the lock for [`client_id`](Self::client_id)
    async fn set_lock(&self, remote: &RelativePath) -> anyhow::Result<()>;

    /// Release a lock held by this client
    ///
    /// Stores that expire locks server-side may keep the default no-op.
    async fn release_lock(&self, _remote: &RelativePath) -> anyhow::Result<()> {
        Ok(())
    }

    // ------------------------------------------------------------------
    // Version deltas
    // ------------------------------------------------------------------

    /// Send a local signature so the store prepares a version signature
    /// (`<remote>.sig.v`) for the next delta upload
    async fn make_version_delta(
        &self,
        signature: &Path,
        remote: &RelativePath,
    ) -> anyhow::Result<()>;

    /// Upload a delta producing the next version of `remote`
    async fn upload_new_version(&self, delta: &Path, remote: &RelativePath) -> anyhow::Result<()>;

    /// Send a local signature and receive the delta that brings the local
    /// file up to the stored version, written to `delta_out`
    async fn download_new_version(
        &self,
        signature: &Path,
        remote: &RelativePath,
        delta_out: &Path,
    ) -> anyhow::Result<PathBuf>;
}

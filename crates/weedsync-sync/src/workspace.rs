//! Scratch workspace
//!
//! Each engine instance owns one private directory under the temp root for
//! signature, delta and patch artifacts. Opening a workspace purges sibling
//! directories with the same name prefix that crashed instances left behind.
//! The directory is removed by [`Workspace::close`] or, failing that, when
//! the handle is dropped.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};
use weedsync_core::domain::RelativePath;

use crate::SyncError;

/// Name prefix of scratch directories
pub const DEFAULT_PREFIX: &str = "Seaweed_Cloud_Storage_";

/// Private scratch directory of one engine instance
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Open a workspace under the system temp directory
    pub fn open(prefix: &str) -> Result<Self, SyncError> {
        Self::open_in(&std::env::temp_dir(), prefix)
    }

    /// Open a workspace under `root`
    pub fn open_in(root: &Path, prefix: &str) -> Result<Self, SyncError> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(root)?;
        let workspace = Self { dir };

        let purged = workspace.purge_stale(root, prefix)?;
        info!(
            path = %workspace.path().display(),
            purged,
            "Scratch workspace opened"
        );
        Ok(workspace)
    }

    /// The workspace directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove every other directory in `root` named with `prefix`
    fn purge_stale(&self, root: &Path, prefix: &str) -> Result<usize, SyncError> {
        let own_name = self.dir.path().file_name();
        let mut purged = 0;

        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            let name = entry.file_name();
            if Some(name.as_os_str()) == own_name {
                continue;
            }
            if !name.to_string_lossy().starts_with(prefix) {
                continue;
            }
            if !entry.file_type()?.is_dir() {
                continue;
            }

            match std::fs::remove_dir_all(entry.path()) {
                Ok(()) => {
                    debug!(path = %entry.path().display(), "Removed stale scratch directory");
                    purged += 1;
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %entry.path().display(), %err, "Could not remove stale scratch directory");
                }
            }
        }

        Ok(purged)
    }

    /// Scratch path for an artifact of `rel` (e.g. suffix `.sig`), with
    /// parent directories created
    pub async fn artifact_path(&self, rel: &RelativePath, suffix: &str) -> Result<PathBuf, SyncError> {
        let path = with_suffix(&rel.to_local(self.path()), suffix);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(path)
    }

    /// Delete the workspace now, reporting any failure
    pub fn close(self) -> Result<(), SyncError> {
        let path = self.path().to_path_buf();
        self.dir.close()?;
        info!(path = %path.display(), "Scratch workspace removed");
        Ok(())
    }
}

/// Append `suffix` to the final component of `path`
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Delete a file, succeeding silently if it is already absent
///
/// Every other failure (permissions, a directory in the way, I/O) is
/// returned.
pub async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

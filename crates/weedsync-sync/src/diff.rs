//! Listing difference
//!
//! Walks the local folder, fetches the remote listing for the same folder
//! and partitions the union of relative paths into local-only, remote-only
//! and present-on-both.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use weedsync_core::domain::{
    ListingDiff, LocalEntry, RelativePath, RemoteEntry, PARTIAL_DOWNLOAD_SUFFIX,
};
use weedsync_core::ports::IRemoteStore;

use crate::SyncError;

/// Partition local and remote paths into the three disjoint sets
pub fn partition(
    local: &BTreeSet<RelativePath>,
    mut remote: BTreeMap<RelativePath, RemoteEntry>,
) -> ListingDiff {
    let mut diff = ListingDiff::default();

    for path in local {
        match remote.remove(path) {
            Some(entry) => diff.both.push((path.clone(), entry)),
            None => {
                diff.local_only.insert(path.clone());
            }
        }
    }
    diff.remote_only = remote.into_keys().collect();

    diff
}

/// The folder's path relative to `base`, `""` when they are the same
pub fn remote_folder(folder: &Path, base: &Path) -> Result<String, SyncError> {
    if folder == base {
        return Ok(String::new());
    }
    let rel = RelativePath::from_local(folder, base).map_err(|_| SyncError::FolderOutsideBase {
        folder: folder.to_path_buf(),
        base: base.to_path_buf(),
    })?;
    Ok(rel.as_str().to_string())
}

/// Collect the regular files under `folder`, with paths relative to `base`
pub async fn walk_local(
    folder: &Path,
    base: &Path,
    recursive: bool,
) -> Result<Vec<LocalEntry>, SyncError> {
    let mut entries = Vec::new();
    walk_directory(folder, base, recursive, &mut entries).await?;
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

fn walk_directory<'a>(
    dir: &'a Path,
    base: &'a Path,
    recursive: bool,
    out: &'a mut Vec<LocalEntry>,
) -> Pin<Box<dyn Future<Output = Result<(), SyncError>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let entry_path = entry.path();
            let metadata = entry.metadata().await?;

            if metadata.is_dir() {
                if recursive {
                    walk_directory(&entry_path, base, recursive, out).await?;
                }
            } else if metadata.is_file() {
                if is_partial_download(&entry_path) {
                    debug!(path = %entry_path.display(), "Skipping partial download");
                    continue;
                }
                let path = match RelativePath::from_local(&entry_path, base) {
                    Ok(p) => p,
                    Err(err) => {
                        warn!(path = %entry_path.display(), %err, "Skipping invalid path");
                        continue;
                    }
                };
                let modified: DateTime<Utc> = metadata.modified()?.into();
                out.push(LocalEntry {
                    path,
                    size: metadata.len(),
                    modified,
                });
            }
        }

        Ok(())
    })
}

fn is_partial_download(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(PARTIAL_DOWNLOAD_SUFFIX))
}

/// Compute the three-way difference for `folder`
///
/// # Errors
/// [`SyncError::ListingFailed`] when the store rejects the listing, so the
/// caller never mistakes an unreachable store for an empty folder.
#[tracing::instrument(skip(store), fields(folder = %folder.display()))]
pub async fn compute_diff(
    store: &dyn IRemoteStore,
    folder: &Path,
    base: &Path,
    recursive: bool,
) -> Result<ListingDiff, SyncError> {
    let rel_folder = remote_folder(folder, base)?;

    let remote_entries =
        store
            .list_folder(&rel_folder, recursive)
            .await
            .map_err(|err| SyncError::ListingFailed {
                folder: rel_folder.clone(),
                reason: format!("{err:#}"),
            })?;

    let mut remote = BTreeMap::new();
    for entry in remote_entries.into_iter().filter(RemoteEntry::is_file) {
        match RelativePath::from_remote(&entry.full_path, store.username()) {
            Ok(path) => {
                remote.insert(path, entry);
            }
            Err(err) => {
                warn!(full_path = %entry.full_path, %err, "Skipping unusable listing entry");
            }
        }
    }

    let local: BTreeSet<RelativePath> = walk_local(folder, base, recursive)
        .await?
        .into_iter()
        .map(|e| e.path)
        .collect();

    let diff = partition(&local, remote);
    debug!(
        local_only = diff.local_only.len(),
        remote_only = diff.remote_only.len(),
        both = diff.both.len(),
        "Listing difference computed"
    );
    Ok(diff)
}

//! Sync orchestrator
//!
//! One call to [`SyncOrchestrator::sync_folder`] runs a full pass:
//!
//! 1. Compute the three-way listing difference
//! 2. Upload local-only and download remote-only files on a bounded worker pool
//! 3. Reconcile files present on both sides under per-file locks, deferring
//!    contended files to later rounds until the retry budget runs out
//!
//! A pass stops early once its [`CancellationToken`] fires. Pool transfers
//! are aborted, no further file is locked, and the file being reconciled
//! gives its lock back before the pass returns.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use weedsync_core::config::Config;
use weedsync_core::domain::{RelativePath, RemoteEntry};
use weedsync_core::ports::{DownloadParams, IDeltaEngine, IRemoteStore};

use crate::comparator::{choose_direction, local_mtime, Direction, FileComparator};
use crate::diff::compute_diff;
use crate::digest::DEFAULT_CHUNK_SIZE;
use crate::lock::{LockCoordinator, LockOutcome};
use crate::retry::{RetryPolicy, RetryQueue};
use crate::workspace::{remove_if_exists, with_suffix, Workspace};
use crate::SyncError;

/// Default size of the transfer worker pool
pub const DEFAULT_WORKERS: usize = 10;

// ============================================================================
// Options and report
// ============================================================================

/// Tunables for a sync pass
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Concurrent one-sided transfers
    pub workers: usize,
    /// Chunk size the store uses when digesting objects
    pub chunk_size: usize,
    /// Schedule for contended files
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.sync.workers.max(1) as usize,
            chunk_size: usize::try_from(config.sync.chunk_size).unwrap_or(DEFAULT_CHUNK_SIZE),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

/// Result of one pool task
#[derive(Debug)]
pub struct TransferOutcome {
    pub path: RelativePath,
    pub direction: Direction,
    pub result: Result<()>,
}

/// A file transfer that failed
#[derive(Debug, Clone, Serialize)]
pub struct TransferFailure {
    pub path: RelativePath,
    pub direction: Direction,
    pub error: String,
}

/// Summary of one sync pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Files sent to the store (whole files and new versions)
    pub uploaded: u32,
    /// Files fetched from the store (whole files and patched versions)
    pub downloaded: u32,
    /// Files found identical on both sides
    pub already_synced: u32,
    /// Failed one-sided transfers
    pub errors: Vec<TransferFailure>,
    /// Pool tasks that panicked or were cancelled
    pub aborted_tasks: u32,
    /// Files still contended when the retry budget ran out
    pub given_up: Vec<RelativePath>,
    /// Retry rounds that ran
    pub retry_rounds: u32,
    /// The pass was cancelled before every file was handled
    pub cancelled: bool,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl SyncReport {
    /// Whether every file was handled
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
            && self.aborted_tasks == 0
            && self.given_up.is_empty()
            && !self.cancelled
    }
}

/// What happened to a file present on both sides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictOutcome {
    AlreadySynced,
    Uploaded,
    Downloaded,
}

// ============================================================================
// SyncOrchestrator
// ============================================================================

/// Drives sync passes against one store
pub struct SyncOrchestrator {
    store: Arc<dyn IRemoteStore>,
    delta: Arc<dyn IDeltaEngine>,
    workspace: Workspace,
    comparator: FileComparator,
    locks: LockCoordinator,
    options: SyncOptions,
    cancel: CancellationToken,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn IRemoteStore>,
        delta: Arc<dyn IDeltaEngine>,
        workspace: Workspace,
        options: SyncOptions,
    ) -> Self {
        Self {
            comparator: FileComparator::new(Arc::clone(&store), options.chunk_size),
            locks: LockCoordinator::new(Arc::clone(&store)),
            store,
            delta,
            workspace,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the running pass, and any later one, when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The scratch workspace this orchestrator owns
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Remove the scratch workspace
    pub fn shutdown(self) -> Result<(), SyncError> {
        self.workspace.close()
    }

    /// Synchronize `folder` (inside `base`) with the store
    ///
    /// # Errors
    /// Fails only when the listing difference cannot be computed; per-file
    /// problems are recorded in the returned [`SyncReport`].
    #[tracing::instrument(skip(self))]
    pub async fn sync_folder(&self, folder: &Path, base: &Path, recursive: bool) -> Result<SyncReport> {
        let start = Instant::now();
        let mut report = SyncReport::default();

        let diff = compute_diff(self.store.as_ref(), folder, base, recursive).await?;
        info!(
            local_only = diff.local_only.len(),
            remote_only = diff.remote_only.len(),
            both = diff.both.len(),
            "Starting sync pass"
        );

        if !self.cancel.is_cancelled() {
            self.transfer_exclusive(diff.local_only, diff.remote_only, base, &mut report)
                .await;
        }
        if !self.cancel.is_cancelled() {
            self.reconcile_shared(diff.both, base, &mut report).await;
        }
        report.cancelled = report.cancelled || self.cancel.is_cancelled();

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            uploaded = report.uploaded,
            downloaded = report.downloaded,
            already_synced = report.already_synced,
            errors = report.errors.len(),
            given_up = report.given_up.len(),
            cancelled = report.cancelled,
            duration_ms = report.duration_ms,
            "Sync pass finished"
        );
        Ok(report)
    }

    // ========================================================================
    // One-sided files
    // ========================================================================

    async fn transfer_exclusive(
        &self,
        local_only: impl IntoIterator<Item = RelativePath>,
        remote_only: impl IntoIterator<Item = RelativePath>,
        base: &Path,
        report: &mut SyncReport,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let mut tasks: JoinSet<TransferOutcome> = JoinSet::new();

        for rel in local_only {
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);
            let local = rel.to_local(base);
            tasks.spawn(async move {
                let result: Result<()> = async {
                    let _permit = semaphore.acquire_owned().await?;
                    store
                        .upload_file(&local, &rel)
                        .await
                        .with_context(|| format!("Failed to upload {rel}"))
                }
                .await;
                TransferOutcome {
                    path: rel,
                    direction: Direction::Upload,
                    result,
                }
            });
        }

        for rel in remote_only {
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);
            let dest_root = base.to_path_buf();
            tasks.spawn(async move {
                let result: Result<()> = async {
                    let _permit = semaphore.acquire_owned().await?;
                    store
                        .download_file(rel.as_str(), &dest_root, &DownloadParams::none())
                        .await
                        .with_context(|| format!("Failed to download {rel}"))?;
                    Ok(())
                }
                .await;
                TransferOutcome {
                    path: rel,
                    direction: Direction::Download,
                    result,
                }
            });
        }

        let mut aborted = false;
        loop {
            let joined = if aborted {
                tasks.join_next().await
            } else {
                tokio::select! {
                    joined = tasks.join_next() => joined,
                    () = self.cancel.cancelled() => {
                        info!(pending = tasks.len(), "Sync cancelled; aborting transfers");
                        tasks.abort_all();
                        aborted = true;
                        continue;
                    }
                }
            };
            let Some(joined) = joined else {
                break;
            };
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_err) if join_err.is_cancelled() => {
                    debug!("Transfer task cancelled");
                    report.aborted_tasks += 1;
                    continue;
                }
                Err(join_err) => {
                    warn!(error = %join_err, "Transfer task aborted");
                    report.aborted_tasks += 1;
                    continue;
                }
            };

            match outcome.result {
                Ok(()) => {
                    debug!(path = %outcome.path, direction = %outcome.direction, "Transfer complete");
                    match outcome.direction {
                        Direction::Upload => report.uploaded += 1,
                        Direction::Download => report.downloaded += 1,
                    }
                }
                Err(err) => {
                    let error = format!("{err:#}");
                    warn!(path = %outcome.path, direction = %outcome.direction, %error, "Transfer failed");
                    report.errors.push(TransferFailure {
                        path: outcome.path,
                        direction: outcome.direction,
                        error,
                    });
                }
            }
        }
    }

    // ========================================================================
    // Files on both sides
    // ========================================================================

    async fn reconcile_shared(
        &self,
        both: Vec<(RelativePath, RemoteEntry)>,
        base: &Path,
        report: &mut SyncReport,
    ) {
        let mut queue = both;
        let mut round = 0u32;

        loop {
            let mut deferred = RetryQueue::new();
            for (rel, entry) in queue {
                if self.cancel.is_cancelled() {
                    report.cancelled = true;
                    return;
                }
                match self.sync_conflict(&rel, &entry, base).await {
                    Some(ConflictOutcome::AlreadySynced) => report.already_synced += 1,
                    Some(ConflictOutcome::Uploaded) => report.uploaded += 1,
                    Some(ConflictOutcome::Downloaded) => report.downloaded += 1,
                    None => deferred.push(rel, entry),
                }
            }

            if deferred.is_empty() {
                break;
            }
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                return;
            }

            round += 1;
            if !self.options.retry.allows(round) {
                report.given_up = deferred.paths().cloned().collect();
                warn!(
                    files = report.given_up.len(),
                    rounds = round - 1,
                    "Retry budget exhausted; leaving contended files for the next pass"
                );
                break;
            }

            let wait = self.options.retry.delay_for_round(round);
            info!(
                round,
                pending = deferred.len(),
                wait_secs = wait.as_secs(),
                "Waiting before retrying contended files"
            );
            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                () = self.cancel.cancelled() => {
                    info!(pending = deferred.len(), "Sync cancelled while waiting to retry");
                    report.cancelled = true;
                    return;
                }
            }
            report.retry_rounds = round;
            queue = deferred.take();
        }
    }

    /// Handle one file present on both sides; `None` defers it
    #[tracing::instrument(skip(self, entry, base), fields(path = %rel))]
    async fn sync_conflict(
        &self,
        rel: &RelativePath,
        entry: &RemoteEntry,
        base: &Path,
    ) -> Option<ConflictOutcome> {
        match self.locks.try_acquire(rel).await {
            Ok(LockOutcome::Acquired) => {}
            Ok(LockOutcome::HeldBy(owner)) => {
                debug!(owner = %owner, "Deferring locked file");
                return None;
            }
            Ok(LockOutcome::LostRace(owner)) => {
                debug!(owner = ?owner, "Deferring file after lost lock race");
                return None;
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "Lock query failed; deferring file");
                return None;
            }
        }

        let local = rel.to_local(base);
        let reconciled = tokio::select! {
            result = self.reconcile(&local, rel, entry) => Some(result),
            () = self.cancel.cancelled() => None,
        };

        let Some(result) = reconciled else {
            settle_patched(&local).await;
            self.locks.release(rel).await;
            info!("Sync cancelled; lock released");
            return None;
        };

        // Released on every outcome, AlreadySynced included
        self.locks.release(rel).await;
        match result {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "Reconcile failed; deferring file");
                None
            }
        }
    }

    async fn reconcile(
        &self,
        local: &Path,
        rel: &RelativePath,
        entry: &RemoteEntry,
    ) -> Result<ConflictOutcome> {
        if self.comparator.is_already_synced(local, rel, entry).await? {
            return Ok(ConflictOutcome::AlreadySynced);
        }

        let local_time = local_mtime(local)
            .await
            .with_context(|| format!("Failed to stat {}", local.display()))?;
        let remote_time = entry.reference_mtime();
        let direction = choose_direction(local_time, remote_time);
        info!(local_time, remote_time, %direction, "Content differs");

        match direction {
            Direction::Upload => {
                self.upload_version(local, rel).await?;
                Ok(ConflictOutcome::Uploaded)
            }
            Direction::Download => {
                self.download_version(local, rel).await?;
                Ok(ConflictOutcome::Downloaded)
            }
        }
    }

    /// Send a delta that turns the stored version into the local file
    async fn upload_version(&self, local: &Path, rel: &RelativePath) -> Result<()> {
        let signature = self.workspace.artifact_path(rel, ".sig").await?;
        let delta = self.workspace.artifact_path(rel, ".delta").await?;
        let mut artifacts = vec![signature.clone(), delta.clone()];

        let result: Result<()> = async {
            self.delta
                .signature(local, &signature)
                .await
                .context("Failed to compute local signature")?;
            self.store
                .make_version_delta(&signature, rel)
                .await
                .context("Failed to request version signature")?;

            let remote_signature = self
                .store
                .download_file(
                    &rel.with_suffix(".sig.v"),
                    self.workspace.path(),
                    &DownloadParams::meta(),
                )
                .await
                .context("Failed to download version signature")?;
            artifacts.push(remote_signature.clone());

            self.delta
                .delta(&remote_signature, local, &delta)
                .await
                .context("Failed to compute delta")?;
            self.store
                .upload_new_version(&delta, rel)
                .await
                .context("Failed to upload new version")?;
            Ok(())
        }
        .await;

        discard(&artifacts).await;
        result
    }

    /// Patch the local file up to the stored version
    async fn download_version(&self, local: &Path, rel: &RelativePath) -> Result<()> {
        let signature = self.workspace.artifact_path(rel, ".sig").await?;
        let delta = self.workspace.artifact_path(rel, ".delta").await?;
        let patched = with_suffix(local, "_2");

        let result: Result<()> = async {
            self.delta
                .signature(local, &signature)
                .await
                .context("Failed to compute local signature")?;
            let received = self
                .store
                .download_new_version(&signature, rel, &delta)
                .await
                .context("Failed to download version delta")?;
            self.delta
                .patch(local, &received, &patched)
                .await
                .context("Failed to apply delta")?;

            remove_if_exists(local)
                .await
                .with_context(|| format!("Failed to remove {}", local.display()))?;
            tokio::fs::rename(&patched, local)
                .await
                .with_context(|| format!("Failed to move patched file to {}", local.display()))?;
            Ok(())
        }
        .await;

        if result.is_err() {
            discard(&[patched]).await;
        }
        discard(&[signature, delta]).await;
        result
    }
}

/// Leave `local` whole after an interrupted patch
///
/// The original is kept while it still exists. Otherwise the patch already
/// finished and the patched copy is moved into place.
async fn settle_patched(local: &Path) {
    let patched = with_suffix(local, "_2");
    if tokio::fs::try_exists(local).await.unwrap_or(true) {
        discard(&[patched]).await;
    } else if let Err(err) = tokio::fs::rename(&patched, local).await {
        debug!(path = %patched.display(), %err, "No patched file to move into place");
    }
}

/// Best-effort removal of scratch files
async fn discard(paths: &[PathBuf]) {
    for path in paths {
        if let Err(err) = remove_if_exists(path).await {
            debug!(path = %path.display(), %err, "Could not remove scratch file");
        }
    }
}

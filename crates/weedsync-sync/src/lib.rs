//! WeedSync Sync - Bidirectional folder synchronization engine
//!
//! Provides:
//! - Three-way difference detection between a local tree and a remote listing
//! - Parallel transfer of files present on one side only
//! - Lock-guarded, delta-based reconciliation of files present on both sides
//! - A bounded retry schedule for contended files
//!
//! ## Modules
//!
//! - [`engine`] - `SyncOrchestrator`, the top-level driver
//! - [`diff`] - Local walk and listing partition
//! - [`comparator`] - Already-synced check and direction decision
//! - [`digest`] - MD5 digests of whole files and store-sized chunks
//! - [`lock`] - Server-held per-file lock acquisition
//! - [`retry`] - Retry queue and backoff policy
//! - [`workspace`] - Scratch directory lifecycle
//! - [`rdiff`] - `IDeltaEngine` adapter over the `rdiff` executable

pub mod comparator;
pub mod diff;
pub mod digest;
pub mod engine;
pub mod lock;
pub mod rdiff;
pub mod retry;
pub mod workspace;

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error occurred during file operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The remote listing could not be fetched
    #[error("Listing failed for '{folder}': {reason}")]
    ListingFailed {
        /// Folder relative to the user root
        folder: String,
        /// Error reported by the store
        reason: String,
    },

    /// The folder to sync is not inside the base directory
    #[error("Folder {folder} is not inside base {base}")]
    FolderOutsideBase {
        folder: PathBuf,
        base: PathBuf,
    },

    /// A domain-level error propagated from weedsync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] weedsync_core::domain::errors::DomainError),
}

//! Per-file lock acquisition
//!
//! Locks live on the store as a tag holding the owner's client id. A lock is
//! only ours once a read-back after `set_lock` returns our id; a concurrent
//! writer that got there first makes the read-back differ.

use std::sync::Arc;

use tracing::{debug, warn};
use weedsync_core::domain::RelativePath;
use weedsync_core::ports::IRemoteStore;

/// Result of one acquisition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// The lock is ours
    Acquired,
    /// Another client already holds the lock
    HeldBy(String),
    /// We requested the lock but the read-back named someone else (or nobody)
    LostRace(Option<String>),
}

impl LockOutcome {
    #[must_use]
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockOutcome::Acquired)
    }
}

/// Acquires and releases file locks for this client
pub struct LockCoordinator {
    store: Arc<dyn IRemoteStore>,
}

impl LockCoordinator {
    pub fn new(store: Arc<dyn IRemoteStore>) -> Self {
        Self { store }
    }

    /// Try once to take the lock on `rel`
    ///
    /// A lock already held under our own id counts as free.
    #[tracing::instrument(skip(self), fields(path = %rel))]
    pub async fn try_acquire(&self, rel: &RelativePath) -> anyhow::Result<LockOutcome> {
        let me = self.store.client_id().as_str();

        if let Some(owner) = self.store.get_lock(rel).await? {
            if owner != me {
                debug!(owner = %owner, "File is locked by another client");
                return Ok(LockOutcome::HeldBy(owner));
            }
        }

        self.store.set_lock(rel).await?;

        match self.store.get_lock(rel).await? {
            Some(owner) if owner == me => {
                debug!("Lock acquired");
                Ok(LockOutcome::Acquired)
            }
            other => {
                debug!(owner = ?other, "Lost lock race");
                Ok(LockOutcome::LostRace(other))
            }
        }
    }

    /// Release the lock on `rel`, logging rather than failing
    pub async fn release(&self, rel: &RelativePath) {
        if let Err(err) = self.store.release_lock(rel).await {
            warn!(path = %rel, error = %err, "Failed to release lock");
        }
    }
}

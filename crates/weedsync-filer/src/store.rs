//! FilerRemoteStore - IRemoteStore implementation for a SeaweedFS filer
//!
//! Listing, whole-file transfer and tags go through [`FilerClient`];
//! version-delta operations open a [`crate::session::TransferSession`] and push the
//! signature or delta file with the transfer protocol.
//!
//! ## Tags
//!
//! - `Md5` holds the base64 whole-file digest once a file is known to be in
//!   sync.
//! - `Lock` holds the client id of the current lock owner.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};
use weedsync_core::config::Config;
use weedsync_core::domain::{ClientId, ContentDigest, RelativePath, RemoteEntry};
use weedsync_core::ports::{DownloadParams, IRemoteStore};
use weedsync_transfer::framing::receive_file;
use weedsync_transfer::session::{push_file, push_folder};
use weedsync_transfer::{Dialect, FolderPushSummary, Operation, PushOutcome};

use crate::client::FilerClient;
use crate::session::TransferEndpoints;
use crate::FilerError;

/// Tag carrying the whole-file digest
pub const CONTENT_HASH_TAG: &str = "Md5";

/// Tag carrying the lock owner's client id
pub const LOCK_TAG: &str = "Lock";

/// [`IRemoteStore`] backed by a filer's HTTP API and transfer sockets
pub struct FilerRemoteStore {
    client: FilerClient,
    transfer: TransferEndpoints,
    client_id: ClientId,
}

impl FilerRemoteStore {
    pub fn new(client: FilerClient, transfer: TransferEndpoints, client_id: ClientId) -> Self {
        Self {
            client,
            transfer,
            client_id,
        }
    }

    /// Build a store from the `filer` and `sync` configuration sections
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = FilerClient::new(&config.filer.url, config.filer.username.clone())
            .context("Failed to create filer client")?;
        let dialect: Dialect = config
            .filer
            .dialect
            .parse()
            .context("Invalid filer.dialect")?;
        let transfer = TransferEndpoints::new(
            config.filer.transfer_control_addr.clone(),
            config.filer.transfer_data_addr.clone(),
            dialect,
        );
        let client_id = config.client_id().context("Failed to resolve client id")?;

        info!(
            url = %client.base_url(),
            username = %client.username(),
            client_id = %client_id,
            "Filer store configured"
        );
        Ok(Self::new(client, transfer, client_id))
    }

    pub fn client(&self) -> &FilerClient {
        &self.client
    }

    /// Push one file over a fresh transfer session and require confirmation
    async fn push(&self, operation: Operation, local: &Path, remote: &str) -> Result<(), FilerError> {
        let mut session = self.transfer.connect(operation).await?;
        let outcome = push_file(&mut session.link, &mut session.data, local, remote).await?;
        match outcome {
            PushOutcome::Completed => {
                debug!(?operation, remote, "Push confirmed");
                Ok(())
            }
            PushOutcome::Declined { reply } | PushOutcome::Unconfirmed { reply } => {
                Err(FilerError::Unconfirmed {
                    path: remote.to_string(),
                    reply,
                })
            }
        }
    }

    /// Push a whole local tree over the transfer protocol
    ///
    /// Directory levels are announced relative to `base`.
    pub async fn push_folder(
        &self,
        root: &Path,
        base: &Path,
        recursive: bool,
    ) -> Result<FolderPushSummary> {
        let mut session = self
            .transfer
            .connect(Operation::PushFolder)
            .await
            .context("Failed to open transfer session")?;
        let summary = push_folder(&mut session.link, &mut session.data, root, base, recursive)
            .await
            .with_context(|| format!("Failed to push {}", root.display()))?;
        info!(
            root = %root.display(),
            levels = summary.levels,
            files = summary.files,
            interrupted = summary.interrupted,
            "Folder pushed"
        );
        Ok(summary)
    }

    /// Push a single file over the transfer protocol instead of HTTP
    pub async fn push_single_file(&self, local: &Path, remote: &RelativePath) -> Result<()> {
        self.push(Operation::PushFile, local, remote.as_str())
            .await
            .with_context(|| format!("Failed to push {remote}"))
    }
}

#[async_trait::async_trait]
impl IRemoteStore for FilerRemoteStore {
    fn username(&self) -> &str {
        self.client.username()
    }

    fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    async fn list_folder(&self, folder: &str, recursive: bool) -> Result<Vec<RemoteEntry>> {
        self.client
            .list(folder, recursive)
            .await
            .with_context(|| format!("Failed to list '{folder}'"))
    }

    async fn upload_file(&self, local: &Path, remote: &RelativePath) -> Result<()> {
        self.client
            .upload(local, remote.as_str())
            .await
            .with_context(|| format!("Failed to upload {remote}"))
    }

    async fn download_file(
        &self,
        remote: &str,
        dest_root: &Path,
        params: &DownloadParams,
    ) -> Result<PathBuf> {
        let dest = RelativePath::new(remote.to_string())
            .with_context(|| format!("Invalid remote path '{remote}'"))?
            .to_local(dest_root);
        self.client
            .download(remote, &dest, params)
            .await
            .with_context(|| format!("Failed to download {remote}"))?;
        Ok(dest)
    }

    async fn get_content_hash(&self, remote: &RelativePath) -> Result<Option<ContentDigest>> {
        let tag = self
            .client
            .get_tag(remote.as_str(), CONTENT_HASH_TAG)
            .await
            .with_context(|| format!("Failed to read content hash of {remote}"))?;
        Ok(ContentDigest::parse_marker(tag.as_deref())?)
    }

    async fn set_content_hash(&self, remote: &RelativePath, digest: &ContentDigest) -> Result<()> {
        self.client
            .set_tag(remote.as_str(), CONTENT_HASH_TAG, &digest.to_base64())
            .await
            .with_context(|| format!("Failed to set content hash of {remote}"))
    }

    async fn remove_tags(&self, remote: &RelativePath) -> Result<()> {
        self.client
            .delete_tag(remote.as_str(), LOCK_TAG)
            .await
            .with_context(|| format!("Failed to clear tags of {remote}"))
    }

    async fn get_lock(&self, remote: &RelativePath) -> Result<Option<String>> {
        let owner = self
            .client
            .get_tag(remote.as_str(), LOCK_TAG)
            .await
            .with_context(|| format!("Failed to read lock of {remote}"))?;
        Ok(owner.filter(|o| !o.is_empty()))
    }

    async fn set_lock(&self, remote: &RelativePath) -> Result<()> {
        self.client
            .set_tag(remote.as_str(), LOCK_TAG, self.client_id.as_str())
            .await
            .with_context(|| format!("Failed to set lock of {remote}"))
    }

    async fn release_lock(&self, remote: &RelativePath) -> Result<()> {
        if self.get_lock(remote).await?.as_deref() == Some(self.client_id.as_str()) {
            self.client
                .delete_tag(remote.as_str(), LOCK_TAG)
                .await
                .with_context(|| format!("Failed to release lock of {remote}"))?;
        }
        Ok(())
    }

    async fn make_version_delta(&self, signature: &Path, remote: &RelativePath) -> Result<()> {
        self.push(Operation::MakeVersionDelta, signature, remote.as_str())
            .await
            .with_context(|| format!("Failed to request version signature for {remote}"))
    }

    async fn upload_new_version(&self, delta: &Path, remote: &RelativePath) -> Result<()> {
        self.push(Operation::UploadNewVersion, delta, remote.as_str())
            .await
            .with_context(|| format!("Failed to upload new version of {remote}"))
    }

    async fn download_new_version(
        &self,
        signature: &Path,
        remote: &RelativePath,
        delta_out: &Path,
    ) -> Result<PathBuf> {
        let mut session = self
            .transfer
            .connect(Operation::DownloadNewVersion)
            .await
            .context("Failed to open transfer session")?;

        match push_file(&mut session.link, &mut session.data, signature, remote.as_str()).await? {
            PushOutcome::Completed => {}
            PushOutcome::Declined { reply } | PushOutcome::Unconfirmed { reply } => {
                return Err(FilerError::Unconfirmed {
                    path: remote.to_string(),
                    reply,
                })
                .with_context(|| format!("Filer refused signature for {remote}"));
            }
        }

        let bytes = receive_file(&mut session.data, delta_out)
            .await
            .with_context(|| format!("Failed to receive delta for {remote}"))?;
        debug!(path = %remote, bytes, "Version delta received");
        Ok(delta_out.to_path_buf())
    }
}

//! Push sessions
//!
//! ## Single-file push
//!
//! 1. Receiver grants with `Continue`
//! 2. Sender replies with the target path
//! 3. Sender streams the framed file on the data channel
//! 4. Receiver answers `Terminate` on success; anything else means it
//!    expects more
//!
//! ## Directory push
//!
//! For every directory level (top-down, pre-order) the receiver grants,
//! the sender emits the level's path relative to the base and its file
//! count, then for each file the receiver grants again and the sender emits
//! the file name followed by its bytes. A non-recursive push stops after
//! the first level.

use std::path::{Component, Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::channel::{ControlChannel, ControlLink};
use crate::framing::{receive_framed_file, send_file, FramedReceipt};
use crate::message::{ControlMessage, Expect};
use crate::TransferError;

/// How a single-file push ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The receiver confirmed with `Terminate`
    Completed,
    /// The receiver did not grant the push; nothing was sent
    Declined { reply: String },
    /// The file was sent but the receiver's final answer was not `Terminate`
    Unconfirmed { reply: String },
}

impl PushOutcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Summary of a directory push
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderPushSummary {
    /// Directory levels announced
    pub levels: usize,
    /// Files streamed
    pub files: usize,
    /// Whether the receiver stopped granting before the walk finished
    pub interrupted: bool,
}

/// One directory level of a push, as announced on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
struct DirLevel {
    dir: PathBuf,
    files: Vec<String>,
}

async fn expect_grant<C: ControlChannel>(
    link: &mut ControlLink<C>,
) -> Result<Option<String>, TransferError> {
    match link.recv(Expect::Directive).await? {
        None => Err(TransferError::ChannelClosed),
        Some(ControlMessage::Continue) => Ok(None),
        Some(other) => Ok(Some(other.to_string())),
    }
}

async fn expect_path<C: ControlChannel>(
    link: &mut ControlLink<C>,
) -> Result<Option<String>, TransferError> {
    match link.recv(Expect::Path).await? {
        None => Ok(None),
        Some(ControlMessage::Path(path)) => Ok(Some(path)),
        Some(other) => Err(TransferError::UnexpectedMessage {
            expected: "path".to_string(),
            got: other.to_string(),
        }),
    }
}

// ============================================================================
// Sender side
// ============================================================================

/// Push one local file to `remote_path`
pub async fn push_file<C, D>(
    link: &mut ControlLink<C>,
    data: &mut D,
    local: &Path,
    remote_path: &str,
) -> Result<PushOutcome, TransferError>
where
    C: ControlChannel,
    D: AsyncWrite + Unpin,
{
    if let Some(reply) = expect_grant(link).await? {
        debug!(remote_path, %reply, "push declined");
        return Ok(PushOutcome::Declined { reply });
    }

    link.send(&ControlMessage::Path(remote_path.to_string()))
        .await?;
    let bytes = send_file(data, local).await?;

    match link.recv(Expect::Directive).await? {
        None => Err(TransferError::ChannelClosed),
        Some(ControlMessage::Terminate) => {
            debug!(remote_path, bytes, "push completed");
            Ok(PushOutcome::Completed)
        }
        Some(other) => Ok(PushOutcome::Unconfirmed {
            reply: other.to_string(),
        }),
    }
}

/// Push the tree under `root`, announcing directories relative to `base`
pub async fn push_folder<C, D>(
    link: &mut ControlLink<C>,
    data: &mut D,
    root: &Path,
    base: &Path,
    recursive: bool,
) -> Result<FolderPushSummary, TransferError>
where
    C: ControlChannel,
    D: AsyncWrite + Unpin,
{
    let levels = collect_levels(root, recursive).await?;
    let mut summary = FolderPushSummary::default();

    for level in levels {
        if let Some(reply) = expect_grant(link).await? {
            debug!(%reply, "folder push stopped by receiver");
            summary.interrupted = true;
            return Ok(summary);
        }

        link.send(&ControlMessage::Path(relative_dir(&level.dir, base)))
            .await?;
        link.send(&ControlMessage::FileCount(level.files.len() as u64))
            .await?;
        summary.levels += 1;

        for name in &level.files {
            if let Some(reply) = expect_grant(link).await? {
                debug!(%reply, "folder push stopped by receiver");
                summary.interrupted = true;
                return Ok(summary);
            }

            link.send(&ControlMessage::Path(name.clone())).await?;
            send_file(data, &level.dir.join(name)).await?;
            summary.files += 1;
        }
    }

    info!(
        root = %root.display(),
        levels = summary.levels,
        files = summary.files,
        "folder push finished"
    );
    Ok(summary)
}

/// Walk `root` top-down in pre-order, one level per directory
async fn collect_levels(root: &Path, recursive: bool) -> Result<Vec<DirLevel>, TransferError> {
    let mut levels = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut files = Vec::new();
        let mut subdirs = Vec::new();

        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                subdirs.push(entry.path());
            } else if file_type.is_file() {
                match entry.file_name().into_string() {
                    Ok(name) => files.push(name),
                    Err(name) => warn!(?name, "Skipping non UTF-8 file name"),
                }
            }
        }

        files.sort();
        subdirs.sort();
        levels.push(DirLevel { dir, files });

        if !recursive {
            break;
        }
        stack.extend(subdirs.into_iter().rev());
    }

    Ok(levels)
}

/// `/`-separated path of `dir` under `base`; empty for `base` itself
///
/// Directories outside `base` are announced with their full path.
fn relative_dir(dir: &Path, base: &Path) -> String {
    match dir.strip_prefix(base) {
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => dir.to_string_lossy().replace('\\', "/"),
    }
}

// ============================================================================
// Receiver side
// ============================================================================

/// Join a peer-supplied relative path under `root`, refusing escapes
fn safe_join(root: &Path, relative: &str) -> Result<PathBuf, TransferError> {
    let mut out = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => {
                return Err(TransferError::InvalidMessage(format!(
                    "path escapes destination: {relative:?}"
                )))
            }
        }
    }
    Ok(out)
}

/// Receive one pushed file into `dest_root`
///
/// Returns the announced path and the receipt for its payload.
pub async fn receive_pushed_file<C, D>(
    link: &mut ControlLink<C>,
    data: &mut D,
    dest_root: &Path,
) -> Result<(String, FramedReceipt), TransferError>
where
    C: ControlChannel,
    D: AsyncRead + Unpin,
{
    link.send(&ControlMessage::Continue).await?;
    let path = expect_path(link)
        .await?
        .ok_or(TransferError::ChannelClosed)?;
    let dest = safe_join(dest_root, &path)?;
    let receipt = receive_framed_file(data, &dest).await?;
    link.send(&ControlMessage::Terminate).await?;
    Ok((path, receipt))
}

/// Receive a pushed directory tree into `dest_root`
///
/// Ends when the sender closes the control channel. Returns the number of
/// files received.
pub async fn receive_folder<C, D>(
    link: &mut ControlLink<C>,
    data: &mut D,
    dest_root: &Path,
) -> Result<usize, TransferError>
where
    C: ControlChannel,
    D: AsyncRead + Unpin,
{
    let mut received = 0usize;

    loop {
        match link.send(&ControlMessage::Continue).await {
            Ok(()) => {}
            Err(TransferError::ChannelClosed) => break,
            Err(err) => return Err(err),
        }

        let Some(dir) = expect_path(link).await? else {
            break;
        };
        let count = match link.recv(Expect::FileCount).await? {
            Some(ControlMessage::FileCount(count)) => count,
            Some(other) => {
                return Err(TransferError::UnexpectedMessage {
                    expected: "file count".to_string(),
                    got: other.to_string(),
                })
            }
            None => return Err(TransferError::ChannelClosed),
        };

        let dir_path = safe_join(dest_root, &dir)?;
        tokio::fs::create_dir_all(&dir_path).await?;

        for _ in 0..count {
            link.send(&ControlMessage::Continue).await?;
            let name = expect_path(link)
                .await?
                .ok_or(TransferError::ChannelClosed)?;
            receive_framed_file(data, &safe_join(&dir_path, &name)?).await?;
            received += 1;
        }
    }

    Ok(received)
}

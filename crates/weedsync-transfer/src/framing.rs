//! Data channel framing
//!
//! A sender writes two big-endian `i64`s, the buffer-size hint
//! ([`BUFFER_SIZE_HINT`]) and the exact payload length, followed by exactly
//! that many raw bytes with no padding.
//!
//! Receivers read in [`RECEIVE_BUFFER_SIZE`] slices and stop as soon as a
//! read returns zero bytes or returns exactly the [`STOP_SENTINEL`].

use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::TransferError;

/// Buffer-size hint sent ahead of every payload
pub const BUFFER_SIZE_HINT: i64 = 8192;

/// Size of each receive read
pub const RECEIVE_BUFFER_SIZE: usize = 16_384;

/// A read consisting of exactly these bytes ends the payload
pub const STOP_SENTINEL: &[u8] = b"stop";

/// Header preceding a framed payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub buffer_hint: i64,
    pub length: u64,
}

/// Result of receiving a framed payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramedReceipt {
    /// Length announced by the header
    pub declared: u64,
    /// Bytes actually written to the destination
    pub written: u64,
}

impl FramedReceipt {
    /// Whether the full declared payload arrived
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.written == self.declared
    }
}

/// Write the two-integer header for a payload of `length` bytes
pub async fn write_header<W>(data: &mut W, length: u64) -> Result<(), TransferError>
where
    W: AsyncWrite + Unpin,
{
    let length = i64::try_from(length)
        .map_err(|_| TransferError::InvalidHeader(format!("payload too large: {length}")))?;
    data.write_i64(BUFFER_SIZE_HINT).await?;
    data.write_i64(length).await?;
    Ok(())
}

/// Read and validate a header
pub async fn read_header<R>(data: &mut R) -> Result<FrameHeader, TransferError>
where
    R: AsyncRead + Unpin,
{
    let buffer_hint = data.read_i64().await?;
    let length = data.read_i64().await?;
    let length = u64::try_from(length)
        .map_err(|_| TransferError::InvalidHeader(format!("negative length {length}")))?;
    Ok(FrameHeader {
        buffer_hint,
        length,
    })
}

/// Stream a local file as one framed payload
///
/// Returns the number of payload bytes sent.
pub async fn send_file<W>(data: &mut W, path: &Path) -> Result<u64, TransferError>
where
    W: AsyncWrite + Unpin,
{
    let file = File::open(path).await?;
    let length = file.metadata().await?.len();

    write_header(data, length).await?;
    let sent = tokio::io::copy(&mut file.take(length), data).await?;
    data.flush().await?;

    if sent != length {
        // The file shrank while we were sending it; the header already went out.
        return Err(TransferError::IoError(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("{} shrank during send: {sent} of {length} bytes", path.display()),
        )));
    }

    debug!(path = %path.display(), bytes = sent, "payload sent");
    Ok(sent)
}

async fn create_destination(dest: &Path) -> Result<File, TransferError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(File::create(dest).await?)
}

fn is_stop(read: &[u8]) -> bool {
    read == STOP_SENTINEL
}

/// Receive an unframed payload into `dest`
///
/// Reads until the stream ends or a read returns exactly the stop sentinel.
/// Returns the number of bytes written.
pub async fn receive_file<R>(data: &mut R, dest: &Path) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut file = create_destination(dest).await?;
    let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
    let mut written = 0u64;

    loop {
        let n = data.read(&mut buf).await?;
        if n == 0 || is_stop(&buf[..n]) {
            break;
        }
        file.write_all(&buf[..n]).await?;
        written += n as u64;
    }

    file.flush().await?;
    debug!(path = %dest.display(), bytes = written, "payload received");
    Ok(written)
}

/// Receive a framed payload into `dest`
///
/// Never reads past the declared length, so several payloads can share one
/// data stream. Stops early on end of stream or the stop sentinel.
pub async fn receive_framed_file<R>(data: &mut R, dest: &Path) -> Result<FramedReceipt, TransferError>
where
    R: AsyncRead + Unpin,
{
    let header = read_header(data).await?;
    let mut file = create_destination(dest).await?;
    let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
    let mut written = 0u64;

    while written < header.length {
        let want = (header.length - written).min(buf.len() as u64) as usize;
        let n = data.read(&mut buf[..want]).await?;
        if n == 0 || is_stop(&buf[..n]) {
            break;
        }
        file.write_all(&buf[..n]).await?;
        written += n as u64;
    }

    file.flush().await?;

    let receipt = FramedReceipt {
        declared: header.length,
        written,
    };
    if !receipt.is_complete() {
        warn!(
            path = %dest.display(),
            declared = receipt.declared,
            written = receipt.written,
            "payload ended before its declared length"
        );
    }
    Ok(receipt)
}

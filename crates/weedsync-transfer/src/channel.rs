//! Control channel implementations
//!
//! [`ControlChannel`] moves raw text frames; [`ControlLink`] layers the
//! dialect on top and speaks [`ControlMessage`]s.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::trace;

use crate::message::{ControlMessage, Dialect, Expect, Operation, PROTOCOL_VERSION};
use crate::TransferError;

/// Longest control frame accepted from a peer
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Ordered, reliable, message-based text exchange
#[async_trait]
pub trait ControlChannel: Send {
    /// Send one frame
    async fn send_text(&mut self, text: String) -> Result<(), TransferError>;

    /// Receive one frame, `None` once the peer has closed the channel
    async fn recv_text(&mut self) -> Result<Option<String>, TransferError>;
}

// ============================================================================
// LineChannel
// ============================================================================

/// Newline-delimited frames over any byte stream (a TCP connection in
/// production)
pub struct LineChannel<T> {
    inner: Framed<T, LinesCodec>,
}

impl<T> LineChannel<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(io: T) -> Self {
        Self {
            inner: Framed::new(io, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
        }
    }
}

#[async_trait]
impl<T> ControlChannel for LineChannel<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_text(&mut self, text: String) -> Result<(), TransferError> {
        self.inner.send(text).await?;
        Ok(())
    }

    async fn recv_text(&mut self) -> Result<Option<String>, TransferError> {
        match self.inner.next().await {
            None => Ok(None),
            Some(frame) => Ok(Some(frame?)),
        }
    }
}

// ============================================================================
// MemoryChannel
// ============================================================================

/// One end of an in-process control channel
#[derive(Debug)]
pub struct MemoryChannel {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// Create two connected in-process channel ends
#[must_use]
pub fn memory_pair() -> (MemoryChannel, MemoryChannel) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        MemoryChannel { tx: a_tx, rx: a_rx },
        MemoryChannel { tx: b_tx, rx: b_rx },
    )
}

#[async_trait]
impl ControlChannel for MemoryChannel {
    async fn send_text(&mut self, text: String) -> Result<(), TransferError> {
        self.tx.send(text).map_err(|_| TransferError::ChannelClosed)
    }

    async fn recv_text(&mut self) -> Result<Option<String>, TransferError> {
        Ok(self.rx.recv().await)
    }
}

// ============================================================================
// ControlLink
// ============================================================================

/// A control channel bound to a wire dialect
pub struct ControlLink<C> {
    channel: C,
    dialect: Dialect,
}

impl<C: ControlChannel> ControlLink<C> {
    pub fn new(channel: C, dialect: Dialect) -> Self {
        Self { channel, dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Send a message; messages the dialect does not carry are skipped
    pub async fn send(&mut self, message: &ControlMessage) -> Result<(), TransferError> {
        if let Some(text) = message.encode(self.dialect)? {
            trace!(message = %text, "control send");
            self.channel.send_text(text).await?;
        }
        Ok(())
    }

    /// Receive the next message, decoded against `expect`
    pub async fn recv(&mut self, expect: Expect) -> Result<Option<ControlMessage>, TransferError> {
        match self.channel.recv_text().await? {
            None => Ok(None),
            Some(text) => {
                trace!(message = %text, ?expect, "control recv");
                ControlMessage::decode(self.dialect, &text, expect).map(Some)
            }
        }
    }

    /// Announce the session's operation (tagged dialect only)
    pub async fn open(&mut self, operation: Operation) -> Result<(), TransferError> {
        self.send(&ControlMessage::hello(operation)).await
    }

    /// Accept a session greeting
    ///
    /// Returns `None` for legacy links, which have no greeting.
    pub async fn accept(&mut self) -> Result<Option<Operation>, TransferError> {
        if self.dialect == Dialect::Legacy {
            return Ok(None);
        }
        match self.recv(Expect::Hello).await? {
            None => Err(TransferError::ChannelClosed),
            Some(ControlMessage::Hello { version, operation }) => {
                if version != PROTOCOL_VERSION {
                    return Err(TransferError::UnsupportedVersion(version));
                }
                Ok(Some(operation))
            }
            Some(other) => Err(TransferError::UnexpectedMessage {
                expected: "hello".to_string(),
                got: other.to_string(),
            }),
        }
    }

    pub fn into_inner(self) -> C {
        self.channel
    }
}

//! WeedSync Transfer - Control/data channel push protocol
//!
//! A transfer pairs a message-based **control channel** with a raw **data
//! channel**. The receiver paces the sender by granting each step on the
//! control channel; file bytes travel on the data channel behind a
//! length-prefixed header.
//!
//! ## Modules
//!
//! - [`message`] - Tagged control vocabulary and its wire dialects
//! - [`channel`] - Control channel implementations (line-framed stream, in-memory)
//! - [`framing`] - Data channel header framing and payload send/receive
//! - [`session`] - Single-file and directory push, plus the receiving side

pub mod channel;
pub mod framing;
pub mod message;
pub mod session;

use thiserror::Error;

pub use channel::{memory_pair, ControlChannel, ControlLink, LineChannel, MemoryChannel};
pub use message::{ControlMessage, Dialect, Expect, Operation, PROTOCOL_VERSION};
pub use session::{FolderPushSummary, PushOutcome};

/// Errors that can occur while running the transfer protocol
#[derive(Debug, Error)]
pub enum TransferError {
    /// An I/O error on the data channel or a local file
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The line codec rejected a control frame
    #[error("Control codec error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    /// The peer closed the control channel mid-exchange
    #[error("Control channel closed")]
    ChannelClosed,

    /// The peer sent a well-formed message that does not fit this step
    #[error("Unexpected control message: expected {expected}, got {got:?}")]
    UnexpectedMessage {
        /// What this step of the handshake waits for
        expected: String,
        /// What actually arrived
        got: String,
    },

    /// A control message could not be encoded or decoded
    #[error("Invalid control message: {0}")]
    InvalidMessage(String),

    /// The peer speaks a different tagged-dialect version
    #[error("Unsupported protocol version {0}")]
    UnsupportedVersion(u32),

    /// The data channel header is malformed
    #[error("Invalid frame header: {0}")]
    InvalidHeader(String),
}

//! WeedSync Filer - SeaweedFS filer adapter
//!
//! Provides:
//! - An HTTP client for the filer metadata API (listing, upload, download,
//!   extended-attribute tags)
//! - Transfer sessions over the filer's control and data sockets
//! - `FilerRemoteStore`, the `IRemoteStore` implementation the sync engine
//!   runs against
//!
//! ## Modules
//!
//! - [`client`] - Filer HTTP client
//! - [`session`] - Control/data socket pairs for push transfers
//! - [`store`] - `IRemoteStore` implementation

pub mod client;
pub mod session;
pub mod store;

use thiserror::Error;
use weedsync_transfer::TransferError;

pub use client::FilerClient;
pub use session::{TransferEndpoints, TransferSession};
pub use store::FilerRemoteStore;

/// Errors that can occur when talking to the filer
#[derive(Debug, Error)]
pub enum FilerError {
    /// The request could not be sent or the body could not be read
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The filer answered with a status of 300 or above
    #[error("Filer returned {status} for {url}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Request URL
        url: String,
    },

    /// The configured filer URL cannot address files
    #[error("Invalid filer URL: {0}")]
    InvalidUrl(String),

    /// A local file could not be read or written
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The transfer protocol failed
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// The filer did not confirm a pushed file
    #[error("Transfer of {path} not confirmed: {reply}")]
    Unconfirmed {
        /// Path announced for the push
        path: String,
        /// The filer's final control message
        reply: String,
    },
}

//! Domain entities
//!
//! This module contains the core domain types for WeedSync:
//! - Newtypes for validated paths, client identities and content digests
//! - Local and remote file entries as produced by walks and listings
//! - The three-way listing partition
//! - Domain-specific error types

pub mod entry;
pub mod errors;
pub mod newtypes;

// Re-export commonly used types
pub use entry::{
    Chunk, ListingDiff, LocalEntry, RemoteEntry, MAX_FILE_MODE, PARTIAL_DOWNLOAD_SUFFIX,
};
pub use errors::DomainError;
pub use newtypes::*;

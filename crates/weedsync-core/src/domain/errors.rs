//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! mostly validation failures of paths, identities and digests.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid relative path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Path does not live under the expected base prefix
    #[error("Path not within base: {0}")]
    PathNotInBase(String),

    /// Invalid content digest (expected base64 of 16 bytes)
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// Invalid client identifier
    #[error("Invalid client id: {0}")]
    InvalidClientId(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

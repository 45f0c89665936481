//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain values.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// RelativePath
// ============================================================================

/// A path relative to the user's remote root (and to the local base path)
///
/// RelativePath ensures the path is:
/// - Non-empty, with `/` separators
/// - Free of leading or trailing `/` and of empty components
/// - Free of `.` and `..` components
///
/// The same value keys a file on both sides of a sync: locally it is joined
/// onto the base directory, remotely it is prefixed with `/{username}/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Create a new RelativePath
    ///
    /// # Errors
    /// Returns error if the path is empty, absolute, or contains
    /// empty, `.` or `..` components
    pub fn new(path: String) -> Result<Self, DomainError> {
        if path.is_empty() {
            return Err(DomainError::InvalidPath("path cannot be empty".to_string()));
        }

        if path.starts_with('/') || path.ends_with('/') {
            return Err(DomainError::InvalidPath(format!(
                "relative path must not start or end with '/': {path}"
            )));
        }

        for component in path.split('/') {
            match component {
                "" => {
                    return Err(DomainError::InvalidPath(format!(
                        "path contains an empty component: {path}"
                    )))
                }
                "." | ".." => {
                    return Err(DomainError::InvalidPath(format!(
                        "path contains invalid traversal: {path}"
                    )))
                }
                _ => {}
            }
        }

        Ok(Self(path))
    }

    /// Build a RelativePath from a local file under `base`
    ///
    /// # Errors
    /// Returns error if `path` is not under `base`, is not valid UTF-8,
    /// or yields an invalid relative path
    pub fn from_local(path: &Path, base: &Path) -> Result<Self, DomainError> {
        let relative = path
            .strip_prefix(base)
            .map_err(|_| DomainError::PathNotInBase(path.display().to_string()))?;

        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    let part = part.to_str().ok_or_else(|| {
                        DomainError::InvalidPath(format!(
                            "path is not valid UTF-8: {}",
                            path.display()
                        ))
                    })?;
                    parts.push(part);
                }
                _ => {
                    return Err(DomainError::InvalidPath(format!(
                        "unexpected component in {}",
                        path.display()
                    )))
                }
            }
        }

        Self::new(parts.join("/"))
    }

    /// Build a RelativePath from a listing `FullPath` by stripping the
    /// `/{username}/` prefix
    ///
    /// # Errors
    /// Returns error if the remainder is not a valid relative path
    pub fn from_remote(full_path: &str, username: &str) -> Result<Self, DomainError> {
        let prefix = format!("/{username}/");
        let stripped = full_path.strip_prefix(&prefix).unwrap_or(full_path);
        Self::new(stripped.to_string())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join a single path component
    ///
    /// # Errors
    /// Returns error if component is empty or contains `/`
    pub fn join(&self, component: &str) -> Result<Self, DomainError> {
        if component.is_empty() || component.contains('/') {
            return Err(DomainError::InvalidPath(format!(
                "Invalid path component: {component}"
            )));
        }
        Self::new(format!("{}/{component}", self.0))
    }

    /// Get the final component
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Get the parent directory, `None` for top-level entries
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0.rfind('/').map(|idx| Self(self.0[..idx].to_string()))
    }

    /// Resolve this path under a local base directory
    #[must_use]
    pub fn to_local(&self, base: &Path) -> PathBuf {
        self.0.split('/').fold(base.to_path_buf(), |acc, c| acc.join(c))
    }

    /// The absolute path of this entry in the user's remote namespace
    #[must_use]
    pub fn to_remote(&self, username: &str) -> String {
        format!("/{username}/{}", self.0)
    }

    /// Append a suffix to the final component (e.g. `.sig`, `.delta`)
    #[must_use]
    pub fn with_suffix(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.0)
    }
}

impl Display for RelativePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RelativePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RelativePath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> Self {
        path.0
    }
}

// ============================================================================
// ClientId
// ============================================================================

/// Identity presented to the store when acquiring file locks
///
/// Sent as a tag value, so it must be non-empty and free of whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    /// Create a ClientId from a configured value
    ///
    /// # Errors
    /// Returns error if the value is empty or contains whitespace
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidClientId(
                "client id cannot be empty".to_string(),
            ));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidClientId(format!(
                "client id must not contain whitespace: {id:?}"
            )));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random identity
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClientId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ClientId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ClientId> for String {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

// ============================================================================
// ContentDigest
// ============================================================================

/// Length of an MD5 digest in bytes
pub const DIGEST_LEN: usize = 16;

/// A 16-byte MD5 content digest
///
/// The store exchanges digests as standard base64; the textual form of this
/// type (Display, serde) uses the same encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; DIGEST_LEN]);

impl ContentDigest {
    /// Wrap raw digest bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Decode a base64 digest
    ///
    /// # Errors
    /// Returns error if the text is not base64 or does not decode to 16 bytes
    pub fn from_base64(text: &str) -> Result<Self, DomainError> {
        let bytes = BASE64
            .decode(text.trim())
            .map_err(|e| DomainError::InvalidDigest(format!("{text}: {e}")))?;
        let bytes: [u8; DIGEST_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            DomainError::InvalidDigest(format!("{text}: expected 16 bytes, got {}", v.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Parse a listing `Md5` field, mapping the unset markers to `None`
    ///
    /// A missing value, an empty string and `none` (any case) all mean the
    /// store has not recorded a whole-file digest.
    ///
    /// # Errors
    /// Returns error if a value is present but is not a valid digest
    pub fn parse_marker(raw: Option<&str>) -> Result<Option<Self>, DomainError> {
        match raw.map(str::trim) {
            None => Ok(None),
            Some(text) if text.is_empty() || text.eq_ignore_ascii_case("none") => Ok(None),
            Some(text) => Self::from_base64(text).map(Some),
        }
    }

    /// Get the raw digest bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Encode as standard base64
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }
}

impl Display for ContentDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl FromStr for ContentDigest {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_base64(&text).map_err(serde::de::Error::custom)
    }
}

//! Control-channel vocabulary
//!
//! [`ControlMessage`] is the closed set of messages exchanged on the control
//! channel. Two wire dialects carry it:
//!
//! - [`Dialect::Legacy`]: bare strings as spoken by existing filers
//!   (`next`, `stop`, a path, a decimal count). Decoding needs to know which
//!   kind of message the current handshake step expects.
//! - [`Dialect::Tagged`]: one JSON envelope per message, e.g.
//!   `{"v":1,"type":"path","value":"docs/a.txt"}`.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::TransferError;

/// Version carried by every tagged envelope
pub const PROTOCOL_VERSION: u32 = 1;

/// Legacy grant / continue directive
pub const LEGACY_CONTINUE: &str = "next";

/// Legacy terminate-with-success directive
pub const LEGACY_TERMINATE: &str = "stop";

/// What a session is about to do, announced by [`ControlMessage::Hello`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    PushFile,
    PushFolder,
    MakeVersionDelta,
    UploadNewVersion,
    DownloadNewVersion,
}

/// A single control-channel message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Session opening (tagged dialect only)
    Hello { version: u32, operation: Operation },
    /// Grant the next step / keep going
    Continue,
    /// A target path, directory path or file name
    Path(String),
    /// Number of files in a directory level
    FileCount(u64),
    /// Finish with success
    Terminate,
    /// Any directive outside the vocabulary; treated as abort/continue
    Unrecognized(String),
}

/// The kind of message a handshake step waits for
///
/// Legacy text is ambiguous on its own (`"12"` may be a path or a count), so
/// decoding is always done against an expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Hello,
    Directive,
    Path,
    FileCount,
}

/// Wire dialect of the control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Legacy,
    Tagged,
}

impl FromStr for Dialect {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "tagged" => Ok(Self::Tagged),
            other => Err(TransferError::InvalidMessage(format!(
                "unknown dialect: {other}"
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    v: u32,
    #[serde(flatten)]
    body: Body,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Body {
    Hello { operation: Operation },
    Continue,
    Path { value: String },
    FileCount { value: u64 },
    Terminate,
}

impl ControlMessage {
    /// Encode for the given dialect
    ///
    /// Returns `Ok(None)` for messages the dialect does not carry (a legacy
    /// session has no `Hello`).
    ///
    /// # Errors
    /// Returns error if the message cannot be represented on a single line
    pub fn encode(&self, dialect: Dialect) -> Result<Option<String>, TransferError> {
        let text = match dialect {
            Dialect::Legacy => match self {
                Self::Hello { .. } => return Ok(None),
                Self::Continue => LEGACY_CONTINUE.to_string(),
                Self::Terminate => LEGACY_TERMINATE.to_string(),
                Self::Path(path) => path.clone(),
                Self::FileCount(count) => count.to_string(),
                Self::Unrecognized(raw) => raw.clone(),
            },
            Dialect::Tagged => {
                let body = match self {
                    Self::Hello { operation, .. } => Body::Hello {
                        operation: *operation,
                    },
                    Self::Continue => Body::Continue,
                    Self::Terminate => Body::Terminate,
                    Self::Path(path) => Body::Path {
                        value: path.clone(),
                    },
                    Self::FileCount(count) => Body::FileCount { value: *count },
                    Self::Unrecognized(raw) => {
                        return Err(TransferError::InvalidMessage(format!(
                            "cannot tag unrecognized message {raw:?}"
                        )))
                    }
                };
                let version = match self {
                    Self::Hello { version, .. } => *version,
                    _ => PROTOCOL_VERSION,
                };
                serde_json::to_string(&Envelope { v: version, body })
                    .map_err(|e| TransferError::InvalidMessage(e.to_string()))?
            }
        };

        if text.contains('\n') || text.contains('\r') {
            return Err(TransferError::InvalidMessage(format!(
                "control messages must fit on one line: {text:?}"
            )));
        }
        Ok(Some(text))
    }

    /// Decode one received frame
    ///
    /// # Errors
    /// Returns error for a malformed count, a tagged envelope of another
    /// version, or text that does not parse where a path or count is due
    pub fn decode(dialect: Dialect, raw: &str, expect: Expect) -> Result<Self, TransferError> {
        match dialect {
            Dialect::Legacy => Self::decode_legacy(raw, expect),
            Dialect::Tagged => Self::decode_tagged(raw, expect),
        }
    }

    fn decode_legacy(raw: &str, expect: Expect) -> Result<Self, TransferError> {
        match expect {
            Expect::Directive => Ok(match raw {
                LEGACY_CONTINUE => Self::Continue,
                LEGACY_TERMINATE => Self::Terminate,
                other => Self::Unrecognized(other.to_string()),
            }),
            Expect::Path => Ok(Self::Path(raw.to_string())),
            Expect::FileCount => raw
                .trim()
                .parse::<u64>()
                .map(Self::FileCount)
                .map_err(|e| TransferError::InvalidMessage(format!("bad file count {raw:?}: {e}"))),
            Expect::Hello => Err(TransferError::InvalidMessage(
                "legacy dialect has no session greeting".to_string(),
            )),
        }
    }

    fn decode_tagged(raw: &str, expect: Expect) -> Result<Self, TransferError> {
        let envelope: Envelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(_) if expect == Expect::Directive => {
                return Ok(Self::Unrecognized(raw.to_string()))
            }
            Err(e) => {
                return Err(TransferError::InvalidMessage(format!(
                    "bad envelope {raw:?}: {e}"
                )))
            }
        };

        if envelope.v != PROTOCOL_VERSION {
            return Err(TransferError::UnsupportedVersion(envelope.v));
        }

        Ok(match envelope.body {
            Body::Hello { operation } => Self::Hello {
                version: envelope.v,
                operation,
            },
            Body::Continue => Self::Continue,
            Body::Path { value } => Self::Path(value),
            Body::FileCount { value } => Self::FileCount(value),
            Body::Terminate => Self::Terminate,
        })
    }

    /// Convenience constructor for the opening greeting
    #[must_use]
    pub fn hello(operation: Operation) -> Self {
        Self::Hello {
            version: PROTOCOL_VERSION,
            operation,
        }
    }
}

impl Display for ControlMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hello { version, operation } => write!(f, "hello v{version} {operation:?}"),
            Self::Continue => write!(f, "{LEGACY_CONTINUE}"),
            Self::Path(path) => write!(f, "{path}"),
            Self::FileCount(count) => write!(f, "{count}"),
            Self::Terminate => write!(f, "{LEGACY_TERMINATE}"),
            Self::Unrecognized(raw) => write!(f, "{raw}"),
        }
    }
}

//! Error taxonomy for the fleet protocol.
//!
//! The classes drive propagation policy: transient I/O is retried and never
//! escalated, corrupt artifacts are treated as absent, policy violations are
//! logged and ignored, and only fatal startup errors may abort a process.

use std::fmt;

#[derive(Debug)]
pub enum ProtocolError {
    /// Share unreachable, sharing violation, timeout. Retried with bounded
    /// backoff; never escalated past the current cycle.
    TransientIo { path: String, reason: String },

    /// Unparsable or truncated artifact. Readers treat the file as absent.
    Corrupt { path: String, reason: String },

    /// Artifact violates a protocol rule (e.g. a command without
    /// `force = true`). Ignored and surfaced only in logs.
    PolicyViolation { reason: String },

    /// Missing executable or required directory at startup. The only class
    /// allowed to abort a process, and only before a supervision loop runs.
    Fatal { reason: String },
}

impl ProtocolError {
    pub fn transient(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ProtocolError::TransientIo {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ProtocolError::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProtocolError::TransientIo { .. })
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::TransientIo { path, reason } => {
                write!(f, "Transient I/O failure on '{}': {}", path, reason)
            }
            ProtocolError::Corrupt { path, reason } => {
                write!(f, "Corrupt artifact '{}': {}", path, reason)
            }
            ProtocolError::PolicyViolation { reason } => {
                write!(f, "Policy violation: {}", reason)
            }
            ProtocolError::Fatal { reason } => {
                write!(f, "Fatal: {}", reason)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

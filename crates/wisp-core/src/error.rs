// ============================================
// File: crates/wisp-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Errors raised while decoding datagrams or deriving keys. Every decode
//! error is a "drop the datagram" condition for the caller; none of them
//! is fatal to the controller.
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use wisp_common::error::CommonError;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error types for protocol and key operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Datagram is not UTF-8 JSON.
    #[error("Malformed datagram: {reason}")]
    MalformedDatagram {
        /// Parser diagnostics
        reason: String,
    },

    /// Datagram is a JSON value other than an object, or has no `type`.
    #[error("Datagram has no string 'type' field")]
    MissingType,

    /// `type` field names no known message.
    #[error("Unrecognized message type '{0}'")]
    UnknownMessageType(String),

    /// `type` is known but the payload does not fit its shape.
    #[error("Invalid '{msg_type}' message: {reason}")]
    InvalidMessage {
        /// Message type that failed to decode
        msg_type: &'static str,
        /// Why the payload was rejected
        reason: String,
    },

    /// Outbound message could not be serialized.
    #[error("Failed to encode '{msg_type}' message: {reason}")]
    Encode {
        /// Message type being encoded
        msg_type: &'static str,
        /// Serializer diagnostics
        reason: String,
    },

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreError {
    /// Creates a `MalformedDatagram` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedDatagram {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the datagram could not be parsed at all, as opposed
    /// to parsing into an unexpected type or shape.
    #[must_use]
    pub const fn is_parse_error(&self) -> bool {
        matches!(self, Self::MalformedDatagram { .. } | Self::MissingType)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::UnknownMessageType("reboot".into());
        assert!(err.to_string().contains("reboot"));

        let err = CoreError::InvalidMessage {
            msg_type: "status",
            reason: "missing field `mac`".into(),
        };
        assert!(err.to_string().contains("status"));
    }

    #[test]
    fn test_parse_classification() {
        assert!(CoreError::malformed("eof").is_parse_error());
        assert!(CoreError::MissingType.is_parse_error());
        assert!(!CoreError::UnknownMessageType("x".into()).is_parse_error());
    }
}

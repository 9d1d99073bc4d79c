// ============================================
// File: crates/wisp-server/src/error.rs
// ============================================
//! # Server Error Types
//!
//! ## Error Categories
//! - Transport/parse: `Core`, dropped datagram
//! - Resolution: `UnknownAsset`, dropped datagram
//! - Validation: `InvalidDocument`, `IncompleteRequest`, nothing persisted
//! - Apply: `ApplyFailed`, previous committed state stays authoritative
//! - Socket: `Transport`, listeners restarted
//! - Steering: `StationUnknown`, `MissingTopology`, no steer sent
//!
//! None of these cross the protocol boundary; assets never see them.
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use wisp_common::error::CommonError;
use wisp_common::{AssetUid, MacAddress};
use wisp_core::error::CoreError;
use wisp_transport::error::TransportError;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server error types.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad { path: String, reason: String },

    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid { field: String, reason: String },

    #[error("No known asset at {addr}")]
    UnknownAsset { addr: String },

    #[error("Invalid configuration document for '{uid}': {reason}")]
    InvalidDocument { uid: AssetUid, reason: String },

    #[error("Request is missing '{field}'")]
    IncompleteRequest { field: &'static str },

    #[error("Configuration rejected: {}", errors.join("; "))]
    ApplyFailed { errors: Vec<String> },

    #[error("Station {0} is unknown or stale")]
    StationUnknown(MacAddress),

    #[error("Target '{target}' cannot serve the station: {reason}")]
    MissingTopology { target: AssetUid, reason: String },

    #[error("Store '{namespace}' failed: {reason}")]
    Store { namespace: &'static str, reason: String },

    #[error("Key derivation failed: {reason}")]
    KeyDerivation { reason: String },

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_document(uid: &AssetUid, reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            uid: uid.clone(),
            reason: reason.into(),
        }
    }

    pub fn missing_topology(target: &AssetUid, reason: impl Into<String>) -> Self {
        Self::MissingTopology {
            target: target.clone(),
            reason: reason.into(),
        }
    }

    pub fn store(namespace: &'static str, reason: impl Into<String>) -> Self {
        Self::Store {
            namespace,
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error came from a listener socket and both
    /// listeners should be rebound.
    #[must_use]
    pub fn should_restart_listeners(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_listener_failure(),
            _ => false,
        }
    }

    /// Returns `true` if the error means a datagram was dropped without
    /// any state change.
    #[must_use]
    pub const fn is_drop(&self) -> bool {
        matches!(
            self,
            Self::Core(_) | Self::UnknownAsset { .. } | Self::IncompleteRequest { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServerError::config_load("/etc/wisp/server.toml", "file not found");
        assert!(err.to_string().contains("/etc/wisp/server.toml"));

        let err = ServerError::ApplyFailed {
            errors: vec!["unknown template 'x'".into(), "bad ssid".into()],
        };
        assert_eq!(
            err.to_string(),
            "Configuration rejected: unknown template 'x'; bad ssid"
        );
    }

    #[test]
    fn test_error_classification() {
        let unknown = ServerError::UnknownAsset {
            addr: "10.8.0.99".into(),
        };
        assert!(unknown.is_drop());

        let recv: ServerError = TransportError::ReceiveFailed {
            reason: "reset".into(),
        }
        .into();
        assert!(recv.should_restart_listeners());
        assert!(!ServerError::IncompleteRequest { field: "uid" }.should_restart_listeners());
    }
}

// ============================================
// File: crates/wisp-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Socket failures, split by whether the listener that raised them is
//! still usable.
//!
//! ## Listener Health
//! ```text
//! BindFailed, ReceiveFailed, SocketSetup ──► listener unusable, rebind both
//! SendFailed                             ──► one datagram lost, socket fine
//! ShuttingDown                           ──► teardown in progress
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Datagram socket failures.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The listener address could not be bound.
    #[error("Cannot bind {addr}: {source}")]
    BindFailed {
        /// Listener address
        addr: SocketAddr,
        /// OS error, `AddrInUse` / `AddrNotAvailable` being the usual ones
        #[source]
        source: io::Error,
    },

    /// Configuring or registering a fresh socket failed.
    #[error("UDP socket setup failed while {step}: {source}")]
    SocketSetup {
        /// Setup step that failed
        step: &'static str,
        /// OS error
        #[source]
        source: io::Error,
    },

    /// A datagram could not be sent.
    #[error("Send to {dest} failed: {reason}")]
    SendFailed {
        /// Destination
        dest: SocketAddr,
        /// OS or transport diagnostics
        reason: String,
    },

    /// The listener's receive failed.
    #[error("Receive failed: {reason}")]
    ReceiveFailed {
        /// OS or transport diagnostics
        reason: String,
    },

    /// The transport was shut down or was never attached.
    #[error("Transport is shutting down")]
    ShuttingDown,
}

impl TransportError {
    /// Wraps a socket setup failure.
    pub fn setup(step: &'static str, source: io::Error) -> Self {
        Self::SocketSetup { step, source }
    }

    /// Returns `true` if the listener that produced this error is unusable
    /// and must be rebound.
    #[must_use]
    pub const fn is_listener_failure(&self) -> bool {
        matches!(
            self,
            Self::ReceiveFailed { .. } | Self::BindFailed { .. } | Self::SocketSetup { .. }
        )
    }
}

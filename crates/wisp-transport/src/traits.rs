// ============================================
// File: crates/wisp-transport/src/traits.rs
// ============================================
//! # Transport Traits
//!
//! ## Creation Reason
//! Abstracts the datagram socket so the control channel can be exercised
//! against [`crate::mock::MockTransport`] in tests.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Implementations must be Send + Sync; one transport is shared by the
//!   listener task and every outbound sender
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use std::net::SocketAddr;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::Result;

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

// ============================================
// PacketSource
// ============================================

/// Metadata about the source of a received datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketSource {
    /// Source address (IP and port).
    pub addr: SocketAddr,
    /// When the datagram was received.
    pub timestamp: Instant,
}

impl PacketSource {
    /// Creates a new `PacketSource` stamped now.
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timestamp: Instant::now(),
        }
    }
}

// ============================================
// Transport Trait
// ============================================

/// Datagram transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Receives one datagram into `buf`.
    ///
    /// # Errors
    /// Returns error if the socket fails or the transport is shut down.
    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, PacketSource)>;

    /// Sends one datagram to `dest`.
    ///
    /// # Errors
    /// Returns error if the send fails.
    async fn send(&self, buf: &[u8], dest: &SocketAddr) -> Result<usize>;

    /// Returns the local address this transport is bound to.
    ///
    /// # Errors
    /// Returns error if the address cannot be determined.
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Shuts down the transport. Later operations return `ShuttingDown`.
    ///
    /// # Errors
    /// Returns error if shutdown fails.
    async fn shutdown(&self) -> Result<()>;

    /// Returns `true` if the transport has not been shut down.
    fn is_active(&self) -> bool;
}

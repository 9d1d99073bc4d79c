// ============================================
// File: crates/wisp-transport/src/udp.rs
// ============================================
//! # UDP Transport Implementation
//!
//! ## Creation Reason
//! Binds the control and raw auth listeners.
//!
//! ## Design Choices
//! - `SO_REUSEADDR` so a listener restart can rebind the same port at once
//! - Atomic shutdown flag checked before every operation
//!
//! ## ⚠️ Important Note for Next Developer
//! - The control listener binds the controller tunnel IP, which only
//!   exists once the tunnel interface is up; a bind failure there is
//!   expected during boot and is retried by the listener supervisor
//!
//! ## Last Modified
//! v0.1.0 - Initial UDP transport implementation

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace};

use crate::error::{Result, TransportError};
use crate::traits::{PacketSource, Transport};

/// UDP-based transport.
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    shutdown: AtomicBool,
}

impl UdpTransport {
    /// Binds to a socket address.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - `BindFailed`: the address is in use or not local
    /// - `SocketSetup`: socket creation or configuration failed
    pub fn bind_addr(addr: SocketAddr) -> Result<Self> {
        debug!(%addr, "Binding UDP listener");

        let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| TransportError::setup("creating the socket", e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| TransportError::setup("enabling SO_REUSEADDR", e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::setup("enabling non-blocking mode", e))?;

        socket
            .bind(&addr.into())
            .map_err(|source| TransportError::BindFailed { addr, source })?;

        let socket = UdpSocket::from_std(socket.into())
            .map_err(|e| TransportError::setup("registering with tokio", e))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| TransportError::setup("reading the bound address", e))?;

        info!(%local_addr, "UDP listener bound");

        Ok(Self {
            socket,
            local_addr,
            shutdown: AtomicBool::new(false),
        })
    }

    fn ensure_active(&self) -> Result<()> {
        if self.shutdown.load(Ordering::Acquire) {
            Err(TransportError::ShuttingDown)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, PacketSource)> {
        self.ensure_active()?;

        let (len, addr) = self
            .socket
            .recv_from(buf)
            .await
            .map_err(|e| TransportError::ReceiveFailed {
                reason: e.to_string(),
            })?;

        trace!(len, peer = %addr, "Datagram received");
        Ok((len, PacketSource::new(addr)))
    }

    async fn send(&self, buf: &[u8], dest: &SocketAddr) -> Result<usize> {
        self.ensure_active()?;

        let len = self
            .socket
            .send_to(buf, dest)
            .await
            .map_err(|e| TransportError::SendFailed {
                dest: *dest,
                reason: e.to_string(),
            })?;

        trace!(len, peer = %dest, "Datagram sent");
        Ok(len)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local_addr)
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::Release);
        debug!(local_addr = %self.local_addr, "UDP listener shut down");
        Ok(())
    }

    fn is_active(&self) -> bool {
        !self.shutdown.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("local_addr", &self.local_addr)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

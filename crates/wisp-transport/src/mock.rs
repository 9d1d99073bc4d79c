// ============================================
// File: crates/wisp-transport/src/mock.rs
// ============================================
//! # In-Memory Transport
//!
//! [`MockTransport`] records every sent datagram and delivers datagrams
//! injected with [`MockTransport::inject`]. [`MockTransport::fail_next_recv`]
//! makes the pending or next `recv` fail, which is how tests trigger a
//! listener restart.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::error::{Result, TransportError};
use crate::traits::{PacketSource, Transport};

enum Inbound {
    Datagram(Vec<u8>, SocketAddr),
    Fail(String),
}

/// Recording datagram transport for tests.
pub struct MockTransport {
    local_addr: SocketAddr,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: AsyncMutex<mpsc::UnboundedReceiver<Inbound>>,
    sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    shutdown: AtomicBool,
}

impl MockTransport {
    /// Creates a transport that reports `local_addr` as its bind address.
    #[must_use]
    pub fn new(local_addr: SocketAddr) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            local_addr,
            inbound_tx,
            inbound_rx: AsyncMutex::new(inbound_rx),
            sent: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Queues a datagram from `from` for the next `recv`.
    pub fn inject(&self, payload: impl Into<Vec<u8>>, from: SocketAddr) {
        let _ = self.inbound_tx.send(Inbound::Datagram(payload.into(), from));
    }

    /// Makes the next `recv` return `ReceiveFailed`.
    pub fn fail_next_recv(&self, reason: impl Into<String>) {
        let _ = self.inbound_tx.send(Inbound::Fail(reason.into()));
    }

    /// Returns every datagram sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.sent.lock().clone()
    }

    /// Returns datagrams sent to `dest`.
    #[must_use]
    pub fn sent_to(&self, dest: SocketAddr) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .iter()
            .filter(|(_, addr)| *addr == dest)
            .map(|(payload, _)| payload.clone())
            .collect()
    }

    /// Removes and returns every datagram sent so far.
    pub fn take_sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        std::mem::take(&mut *self.sent.lock())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, PacketSource)> {
        if !self.is_active() {
            return Err(TransportError::ShuttingDown);
        }

        let mut rx = self.inbound_rx.lock().await;
        match rx.recv().await {
            Some(Inbound::Datagram(payload, from)) => {
                let len = payload.len().min(buf.len());
                buf[..len].copy_from_slice(&payload[..len]);
                Ok((len, PacketSource::new(from)))
            }
            Some(Inbound::Fail(reason)) => Err(TransportError::ReceiveFailed { reason }),
            None => Err(TransportError::ShuttingDown),
        }
    }

    async fn send(&self, buf: &[u8], dest: &SocketAddr) -> Result<usize> {
        if !self.is_active() {
            return Err(TransportError::ShuttingDown);
        }
        self.sent.lock().push((buf.to_vec(), *dest));
        Ok(buf.len())
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local_addr)
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::Release);
        Ok(())
    }

    fn is_active(&self) -> bool {
        !self.shutdown.load(Ordering::Acquire)
    }
}

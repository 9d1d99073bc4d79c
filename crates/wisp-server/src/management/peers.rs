// ============================================
// File: crates/wisp-server/src/management/peers.rs
// ============================================
//! # Tunnel Peer Table
//!
//! ## Creation Reason
//! The tunnel provisioner (outside this process) adopts assets as peers
//! and writes their allowed IPs. The controller only reads that table.
//!
//! ## File Format
//! ```json
//! {
//!   "peers": [{"publicKey": "...", "allowedIPs": ["10.8.0.7/32"]}],
//!   "overrides": [{"publicKey": "...", "privateKey": "..."}]
//! }
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial peer table readers

use std::net::IpAddr;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use wisp_common::{TunnelPrivateKey, TunnelPublicKey};

use crate::error::{Result, ServerError};

/// One adopted tunnel peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    /// Peer public key.
    #[serde(rename = "publicKey")]
    pub public_key: TunnelPublicKey,
    /// Allowed IPs in CIDR notation; the first one is the tunnel address.
    #[serde(rename = "allowedIPs", default)]
    pub allowed_ips: Vec<String>,
}

impl PeerEntry {
    /// Tunnel address: the host part of the first parsable allowed IP.
    #[must_use]
    pub fn tunnel_ip(&self) -> Option<IpAddr> {
        self.allowed_ips
            .iter()
            .find_map(|cidr| cidr.split('/').next()?.trim().parse().ok())
    }
}

/// Private key an asset must use instead of its self-generated one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOverride {
    /// Public key the override applies to.
    #[serde(rename = "publicKey")]
    pub public_key: TunnelPublicKey,
    /// Replacement private key.
    #[serde(rename = "privateKey")]
    pub private_key: TunnelPrivateKey,
}

/// Full peer table contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSnapshot {
    /// Adopted peers.
    #[serde(default)]
    pub peers: Vec<PeerEntry>,
    /// Private key overrides.
    #[serde(default)]
    pub overrides: Vec<KeyOverride>,
}

/// Source of the tunnel peer table.
#[async_trait]
pub trait PeerTable: Send + Sync {
    /// Reads the current table.
    async fn snapshot(&self) -> Result<PeerSnapshot>;
}

// ============================================
// FilePeerTable
// ============================================

/// Peer table read from a JSON file. A missing file is an empty table.
#[derive(Debug, Clone)]
pub struct FilePeerTable {
    path: PathBuf,
}

impl FilePeerTable {
    /// Creates a reader for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PeerTable for FilePeerTable {
    async fn snapshot(&self) -> Result<PeerSnapshot> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ServerError::config_load(self.path.display().to_string(), e.to_string())
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Peer table not present yet");
                Ok(PeerSnapshot::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================
// StaticPeerTable
// ============================================

/// In-memory peer table. Tests adopt assets by adding peers.
#[derive(Debug, Default)]
pub struct StaticPeerTable {
    inner: RwLock<PeerSnapshot>,
}

impl StaticPeerTable {
    /// Creates a table with the given contents.
    #[must_use]
    pub fn new(snapshot: PeerSnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    /// Adds a peer with a single /32 allowed IP.
    pub fn adopt(&self, public_key: TunnelPublicKey, tunnel_ip: IpAddr) {
        let prefix = if tunnel_ip.is_ipv4() { 32 } else { 128 };
        let mut inner = self.inner.write();
        inner.peers.retain(|p| p.public_key != public_key);
        inner.peers.push(PeerEntry {
            public_key,
            allowed_ips: vec![format!("{tunnel_ip}/{prefix}")],
        });
    }

    /// Adds a private key override.
    pub fn set_override(&self, public_key: TunnelPublicKey, private_key: TunnelPrivateKey) {
        let mut inner = self.inner.write();
        inner.overrides.retain(|o| o.public_key != public_key);
        inner.overrides.push(KeyOverride {
            public_key,
            private_key,
        });
    }
}

#[async_trait]
impl PeerTable for StaticPeerTable {
    async fn snapshot(&self) -> Result<PeerSnapshot> {
        Ok(self.inner.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: &str = "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=";

    #[test]
    fn test_tunnel_ip_from_cidr() {
        let entry = PeerEntry {
            public_key: KEY_A.parse().unwrap(),
            allowed_ips: vec!["garbage".into(), "10.8.0.7/32".into(), "10.8.0.8/32".into()],
        };
        assert_eq!(entry.tunnel_ip(), Some("10.8.0.7".parse().unwrap()));

        let empty = PeerEntry {
            public_key: KEY_A.parse().unwrap(),
            allowed_ips: vec![],
        };
        assert_eq!(empty.tunnel_ip(), None);
    }

    #[tokio::test]
    async fn test_file_table_parses_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peers.json");

        let table = FilePeerTable::new(&path);
        assert_eq!(table.snapshot().await.unwrap(), PeerSnapshot::default());

        let json = format!(
            r#"{{"peers":[{{"publicKey":"{KEY_A}","allowedIPs":["10.8.0.7/32"]}}],
                "overrides":[{{"publicKey":"{KEY_A}","privateKey":"AgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgI="}}]}}"#
        );
        std::fs::write(&path, json).unwrap();

        let snapshot = table.snapshot().await.unwrap();
        assert_eq!(snapshot.peers.len(), 1);
        assert_eq!(snapshot.overrides[0].private_key.as_bytes(), &[2u8; 32]);
    }

    #[tokio::test]
    async fn test_static_adopt_replaces_existing_peer() {
        let table = StaticPeerTable::default();
        let key: TunnelPublicKey = KEY_A.parse().unwrap();
        table.adopt(key.clone(), "10.8.0.7".parse().unwrap());
        table.adopt(key, "10.8.0.9".parse().unwrap());

        let snapshot = table.snapshot().await.unwrap();
        assert_eq!(snapshot.peers.len(), 1);
        assert_eq!(snapshot.peers[0].allowed_ips, vec!["10.8.0.9/32".to_string()]);
    }
}

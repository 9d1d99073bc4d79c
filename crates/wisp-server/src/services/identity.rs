// ============================================
// File: crates/wisp-server/src/services/identity.rs
// ============================================
//! # Identity Registry
//!
//! ## Creation Reason
//! Answers "who is this asset" for every inbound datagram and "where is
//! this asset" for every outbound one.
//!
//! ## Main Functionality
//! - uid ↔ public key bindings, one-to-one
//! - public key → tunnel IP from the peer table, and the reverse
//! - public key → private key override from the peer table
//!
//! ## Lookup Chains
//! ```text
//! inbound:  source IP ──peer table──► public key ──bindings──► uid
//! outbound: uid ──bindings──► public key ──peer table──► tunnel IP
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Bindings live under one lock so both directions change together
//! - The peer index is replaced wholesale on refresh, never patched
//! - Everything here is rebuildable: bindings from the effective config
//!   store, peers from the peer table
//!
//! ## Last Modified
//! v0.1.0 - Initial identity registry

use std::collections::HashMap;
use std::net::IpAddr;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use wisp_common::{AssetUid, TunnelPrivateKey, TunnelPublicKey};

use crate::management::PeerSnapshot;

#[derive(Debug, Default)]
struct Bindings {
    by_uid: HashMap<AssetUid, TunnelPublicKey>,
    by_key: HashMap<TunnelPublicKey, AssetUid>,
}

#[derive(Debug, Default)]
struct PeerIndex {
    ip_by_key: HashMap<TunnelPublicKey, IpAddr>,
    key_by_ip: HashMap<IpAddr, TunnelPublicKey>,
    private_by_key: HashMap<TunnelPublicKey, TunnelPrivateKey>,
}

/// Identity registry.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    bindings: RwLock<Bindings>,
    peers: RwLock<PeerIndex>,
}

impl IdentityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================
    // Bindings
    // ========================================

    /// Binds `uid` to `key`, unbinding whatever either was bound to before.
    ///
    /// Returns `true` if the registry changed.
    pub fn register_asset(&self, uid: &AssetUid, key: &TunnelPublicKey) -> bool {
        let mut b = self.bindings.write();

        if b.by_uid.get(uid) == Some(key) {
            return false;
        }

        if let Some(prev_uid) = b.by_key.insert(key.clone(), uid.clone()) {
            if &prev_uid != uid {
                warn!(uid = %uid, previous = %prev_uid, "Public key reassigned to a different asset");
                b.by_uid.remove(&prev_uid);
            }
        }
        if let Some(prev_key) = b.by_uid.insert(uid.clone(), key.clone()) {
            if &prev_key != key {
                debug!(uid = %uid, "Asset public key rotated");
                b.by_key.remove(&prev_key);
            }
        }

        info!(uid = %uid, public_key = %key, "Asset identity registered");
        true
    }

    /// Removes both directions of `uid`'s binding. Absent uids are ignored.
    pub fn deregister(&self, uid: &AssetUid) {
        let mut b = self.bindings.write();
        if let Some(key) = b.by_uid.remove(uid) {
            b.by_key.remove(&key);
            info!(uid = %uid, "Asset identity removed");
        }
    }

    /// Returns the key bound to `uid`.
    #[must_use]
    pub fn public_key_of(&self, uid: &AssetUid) -> Option<TunnelPublicKey> {
        self.bindings.read().by_uid.get(uid).cloned()
    }

    /// Returns `true` if `uid` has a binding.
    #[must_use]
    pub fn contains(&self, uid: &str) -> bool {
        self.bindings.read().by_uid.contains_key(uid)
    }

    /// Returns every bound uid.
    #[must_use]
    pub fn uids(&self) -> Vec<AssetUid> {
        self.bindings.read().by_uid.keys().cloned().collect()
    }

    /// Number of bound assets.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bindings.read().by_uid.len()
    }

    // ========================================
    // Peer Table
    // ========================================

    /// Replaces the peer index with `snapshot`.
    pub fn apply_peers(&self, snapshot: &PeerSnapshot) {
        let mut index = PeerIndex::default();
        for peer in &snapshot.peers {
            match peer.tunnel_ip() {
                Some(ip) => {
                    index.ip_by_key.insert(peer.public_key.clone(), ip);
                    index.key_by_ip.insert(ip, peer.public_key.clone());
                }
                None => debug!(public_key = %peer.public_key, "Peer without usable allowed IP"),
            }
        }
        for o in &snapshot.overrides {
            index.private_by_key.insert(o.public_key.clone(), o.private_key.clone());
        }

        let peers = index.ip_by_key.len();
        *self.peers.write() = index;
        debug!(peers, "Peer index refreshed");
    }

    /// Tunnel IP assigned to `key`, if it is an adopted peer.
    #[must_use]
    pub fn tunnel_ip_of_key(&self, key: &TunnelPublicKey) -> Option<IpAddr> {
        self.peers.read().ip_by_key.get(key).copied()
    }

    /// Public key of the peer owning `ip`.
    #[must_use]
    pub fn public_key_at(&self, ip: IpAddr) -> Option<TunnelPublicKey> {
        self.peers.read().key_by_ip.get(&ip).cloned()
    }

    /// Private key override for `uid`.
    #[must_use]
    pub fn private_key_override(&self, uid: &AssetUid) -> Option<TunnelPrivateKey> {
        let key = self.public_key_of(uid)?;
        self.peers.read().private_by_key.get(&key).cloned()
    }

    // ========================================
    // Resolution
    // ========================================

    /// source IP → public key → uid.
    #[must_use]
    pub fn resolve_uid_by_address(&self, ip: IpAddr) -> Option<AssetUid> {
        let key = self.public_key_at(ip)?;
        self.bindings.read().by_key.get(&key).cloned()
    }

    /// uid → public key → tunnel IP.
    #[must_use]
    pub fn resolve_ip_by_uid(&self, uid: &AssetUid) -> Option<IpAddr> {
        let key = self.public_key_of(uid)?;
        self.tunnel_ip_of_key(&key)
    }
}

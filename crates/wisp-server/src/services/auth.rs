// ============================================
// File: crates/wisp-server/src/services/auth.rs
// ============================================
//! # Authentication Handshake
//!
//! ## Creation Reason
//! Bootstraps trust with an asset before a tunnel exists and keeps its
//! key binding current once it does.
//!
//! ## Asset States (controller view)
//! ```text
//! Unknown
//!   │ raw_auth_register {uid, publicKey}
//!   ▼
//! RawRegistered ── placeholder entry committed under the config lock
//!   │ external provisioner adds the key to the peer table
//!   ▼
//! PeerAdopted
//!   │ next raw_auth_register (asset retries)
//!   ▼
//! Granted ── raw_auth_grant sent to the requester
//!   │ asset brings the tunnel up
//!   ▼
//! Active ── auth_register / pull_config / status on the control channel
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Grants are demand-driven: nothing is sent when adoption completes,
//!   only when the asset asks again
//! - The whole read-modify-write of the network document happens under
//!   the config manager's lock; never call `try_apply` without it
//! - An apply error aborts the registration; nothing is saved
//!
//! ## Last Modified
//! v0.1.0 - Initial handshake implementation

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tracing::{debug, info, warn};

use wisp_common::{AssetUid, TunnelPrivateKey, TunnelPublicKey};
use wisp_core::protocol::{RawAuthGrant, TunnelParams};

use crate::error::{Result, ServerError};
use crate::management::{default_template_id, AssetEntry, ConfigManager};
use crate::services::IdentityRegistry;

// ============================================
// ControllerTunnel
// ============================================

/// Controller side of the tunnel, as handed to assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerTunnel {
    /// Controller public key; `None` if derivation failed.
    pub public_key: Option<TunnelPublicKey>,
    /// Controller tunnel address.
    pub controller_ip: IpAddr,
    /// Tunnel listen port.
    pub listen_port: u16,
    /// Public `host:port`.
    pub endpoint: Option<String>,
}

impl ControllerTunnel {
    /// Grant for an asset at `tunnel_ip`; `None` without a controller key.
    #[must_use]
    pub fn grant_for(&self, tunnel_ip: IpAddr) -> Option<RawAuthGrant> {
        Some(RawAuthGrant {
            public_key: self.public_key.clone()?,
            controller_ip: self.controller_ip,
            tunnel_ip,
            listen_port: self.listen_port,
            endpoint: self.endpoint.clone(),
        })
    }

    /// Tunnel parameters carried in `push_config`.
    #[must_use]
    pub fn params_for(&self, tunnel_ip: Option<IpAddr>, private_key: Option<TunnelPrivateKey>) -> TunnelParams {
        TunnelParams {
            public_key: self.public_key.clone(),
            controller_ip: self.controller_ip,
            listen_port: self.listen_port,
            private_key,
            tunnel_ip,
            endpoint: self.endpoint.clone(),
        }
    }
}

// ============================================
// AuthHandshake
// ============================================

/// Outcome of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Key already bound and persisted; nothing written.
    Unchanged,
    /// Network document updated, applied and saved.
    Committed,
}

/// Registration processing shared by the raw and control channels.
pub struct AuthHandshake {
    identity: Arc<IdentityRegistry>,
    config: Arc<dyn ConfigManager>,
    tunnel: Arc<ControllerTunnel>,
    default_device_type: String,
}

impl AuthHandshake {
    /// Creates the handshake service.
    pub fn new(
        identity: Arc<IdentityRegistry>,
        config: Arc<dyn ConfigManager>,
        tunnel: Arc<ControllerTunnel>,
        default_device_type: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            config,
            tunnel,
            default_device_type: default_device_type.into(),
        }
    }

    /// Ensures the network document has an entry for `uid` carrying `key`.
    ///
    /// # Errors
    /// - `ApplyFailed`: the updated document was rejected; nothing saved
    /// - `Store`/`Io`: saving failed after a successful apply
    pub async fn process_auth_register(
        &self,
        uid: &AssetUid,
        key: &TunnelPublicKey,
        device_type: Option<&str>,
    ) -> Result<Registration> {
        let device_type = device_type.unwrap_or(&self.default_device_type);
        let _guard = self.config.acquire_lock().await;

        let mut doc = self.config.active_config().await;
        let template_added = doc.ensure_default_template(device_type);

        let persisted = doc.assets.get(uid).and_then(|e| e.public_key.as_ref());
        let bound = self.identity.public_key_of(uid);
        if !template_added && persisted == Some(key) && bound.as_ref() == Some(key) {
            debug!(uid = %uid, "Registration unchanged");
            return Ok(Registration::Unchanged);
        }

        let entry = doc
            .assets
            .entry(uid.clone())
            .or_insert_with(|| AssetEntry::placeholder(default_template_id(device_type)));
        entry.public_key = Some(key.clone());
        for previous in doc.release_key(key, uid) {
            info!(uid = %uid, previous = %previous, "Public key moved from another asset");
        }

        let errors = self.config.try_apply(doc.clone()).await;
        if !errors.is_empty() {
            warn!(uid = %uid, errors = ?errors, "Registration rejected by configuration apply");
            return Err(ServerError::ApplyFailed { errors });
        }
        self.config.save(&doc).await?;

        info!(uid = %uid, public_key = %key, device_type, "Asset registered");
        Ok(Registration::Committed)
    }

    /// Handles a raw (pre-tunnel) registration from `from`.
    ///
    /// Returns the grant to send back once the key is an adopted peer.
    ///
    /// # Errors
    /// - `IncompleteRequest`: `uid` or `publicKey` missing
    /// - as [`Self::process_auth_register`]
    pub async fn process_raw_auth_message(
        &self,
        uid: Option<AssetUid>,
        key: Option<TunnelPublicKey>,
        device_type: Option<&str>,
        from: SocketAddr,
    ) -> Result<Option<RawAuthGrant>> {
        let key = key.ok_or(ServerError::IncompleteRequest { field: "publicKey" })?;
        let uid = uid.ok_or(ServerError::IncompleteRequest { field: "uid" })?;

        self.process_auth_register(&uid, &key, device_type).await?;

        let Some(tunnel_ip) = self.identity.tunnel_ip_of_key(&key) else {
            debug!(uid = %uid, peer = %from, "Registered, awaiting peer adoption");
            return Ok(None);
        };

        match self.tunnel.grant_for(tunnel_ip) {
            Some(grant) => {
                info!(uid = %uid, peer = %from, tunnel_ip = %tunnel_ip, "Raw auth granted");
                Ok(Some(grant))
            }
            None => {
                warn!(uid = %uid, "Adopted asset cannot be granted without a controller public key");
                Ok(None)
            }
        }
    }
}

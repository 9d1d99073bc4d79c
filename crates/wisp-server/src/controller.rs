// ============================================
// File: crates/wisp-server/src/controller.rs
// ============================================
//! # Controller State
//!
//! ## Creation Reason
//! Owns every piece of controller state and wires the services together,
//! so the listener supervisor and management callers share one instance
//! instead of ambient globals.
//!
//! ## Startup Order
//! ```text
//! 1. EffectiveConfigStore::load   ─► cache + identity bindings restored
//! 2. PeerTable::snapshot          ─► key ↔ tunnel IP map
//! 3. LocalConfigManager::open     ─► network document
//! 4. apply_active                 ─► offline edits committed (and queued)
//! 5. ControlChannel (detached)    ─► supervisor attaches transports
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `open` must run inside a tokio runtime: step 4 can schedule pushes
//! - The returned receiver carries fired push timers; hand it to
//!   `ControlChannel::run_push_worker` or pushes are never sent
//!
//! ## Last Modified
//! v0.1.0 - Initial controller state bundle

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use wisp_common::{AssetUid, MacAddress};
use wisp_core::protocol::SteerCommand;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::handlers::{ChannelServices, ControlChannel};
use crate::management::{ConfigManager, HashStore, LocalConfigManager, NetworkDocument, PeerTable};
use crate::services::{
    AssetStatus, AuthHandshake, ControllerTunnel, EffectiveConfigStore, IdentityRegistry,
    PushScheduler, StationStatus, StatusAggregator, SteeringEngine,
};

/// Settings the controller state depends on.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Push debounce window.
    pub push_debounce: Duration,
    /// Station freshness window.
    pub station_ttl: Duration,
    /// Device type for registrations without one.
    pub default_device_type: String,
    /// Port assets receive controller messages on.
    pub asset_port: u16,
    /// Network document location; `None` keeps it in memory.
    pub network_config_file: Option<PathBuf>,
}

impl ControllerSettings {
    /// Settings from the server configuration.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            push_debounce: config.control.push_debounce(),
            station_ttl: config.control.station_ttl(),
            default_device_type: config.control.default_device_type.clone(),
            asset_port: config.network.asset_port,
            network_config_file: Some(config.storage.network_config_file.clone()),
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        let config = ServerConfig::default();
        Self {
            network_config_file: None,
            ..Self::from_config(&config)
        }
    }
}

/// Controller state bundle.
pub struct Controller {
    identity: Arc<IdentityRegistry>,
    scheduler: Arc<PushScheduler>,
    effective: Arc<EffectiveConfigStore>,
    status: Arc<StatusAggregator>,
    steering: SteeringEngine,
    config: Arc<dyn ConfigManager>,
    peers: Arc<dyn PeerTable>,
    channel: Arc<ControlChannel>,
}

impl Controller {
    /// Restores persisted state and assembles the services.
    ///
    /// # Errors
    /// Fails if the store or network document cannot be read. Peer table
    /// and apply failures are logged and leave the previous state in place.
    pub async fn open(
        settings: ControllerSettings,
        store: Arc<dyn HashStore>,
        peers: Arc<dyn PeerTable>,
        tunnel: ControllerTunnel,
    ) -> Result<(Self, mpsc::UnboundedReceiver<AssetUid>)> {
        let identity = Arc::new(IdentityRegistry::new());
        let (scheduler, ready) = PushScheduler::new(settings.push_debounce);
        let scheduler = Arc::new(scheduler);
        let effective = Arc::new(EffectiveConfigStore::new(
            Arc::clone(&store),
            Arc::clone(&identity),
            Arc::clone(&scheduler),
        ));
        effective.load().await?;

        let manager = match &settings.network_config_file {
            Some(path) => LocalConfigManager::open(path, Arc::clone(&effective)).await?,
            None => LocalConfigManager::new(NetworkDocument::default(), Arc::clone(&effective)),
        };
        let manager = Arc::new(manager);

        let status = Arc::new(StatusAggregator::new(
            store,
            Arc::clone(&identity),
            settings.station_ttl,
        ));
        let tunnel = Arc::new(tunnel);
        let config: Arc<dyn ConfigManager> = Arc::clone(&manager) as Arc<dyn ConfigManager>;
        let auth = Arc::new(AuthHandshake::new(
            Arc::clone(&identity),
            Arc::clone(&config),
            Arc::clone(&tunnel),
            settings.default_device_type,
        ));

        let channel = Arc::new(ControlChannel::new(
            ChannelServices {
                identity: Arc::clone(&identity),
                effective: Arc::clone(&effective),
                scheduler: Arc::clone(&scheduler),
                status: Arc::clone(&status),
                auth,
                tunnel,
            },
            settings.asset_port,
        ));

        let controller = Self {
            identity,
            scheduler,
            effective,
            steering: SteeringEngine::new(Arc::clone(&status)),
            status,
            config,
            peers,
            channel,
        };

        if let Err(e) = controller.refresh_peers().await {
            warn!(error = %e, "Peer table unavailable at startup");
        }
        if let Err(e) = manager.apply_active().await {
            warn!(error = %e, "Stored network configuration not applied");
        }

        info!(
            assets = controller.identity.count(),
            documents = controller.effective.uids().len(),
            "Controller state ready"
        );
        Ok((controller, ready))
    }

    /// The control channel handler.
    #[must_use]
    pub fn channel(&self) -> &Arc<ControlChannel> {
        &self.channel
    }

    /// The identity registry.
    #[must_use]
    pub fn identity(&self) -> &Arc<IdentityRegistry> {
        &self.identity
    }

    /// The effective config store.
    #[must_use]
    pub fn effective(&self) -> &Arc<EffectiveConfigStore> {
        &self.effective
    }

    /// The push scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<PushScheduler> {
        &self.scheduler
    }

    /// The configuration manager.
    #[must_use]
    pub fn config(&self) -> &Arc<dyn ConfigManager> {
        &self.config
    }

    /// Reloads the peer table into the registry. Returns the peer count.
    ///
    /// # Errors
    /// Fails if the table cannot be read; the previous mapping stays.
    pub async fn refresh_peers(&self) -> Result<usize> {
        let snapshot = self.peers.snapshot().await?;
        self.identity.apply_peers(&snapshot);
        Ok(snapshot.peers.len())
    }

    /// Steers a station onto `target` through its current asset.
    ///
    /// # Errors
    /// - `Common`: `sta_mac` is not a MAC address
    /// - `StationUnknown` / `MissingTopology`: nothing was sent
    /// - `UnknownAsset` / `Transport`: the send failed
    pub async fn steer(
        &self,
        sta_mac: &str,
        target: &str,
        target_ssid: Option<&str>,
        target_band: Option<&str>,
    ) -> Result<SteerCommand> {
        let result = self.try_steer(sta_mac, target, target_ssid, target_band).await;
        if let Err(e) = &result {
            warn!(sta = sta_mac, target, error = %e, "Steer not issued");
        }
        result
    }

    async fn try_steer(
        &self,
        sta_mac: &str,
        target: &str,
        target_ssid: Option<&str>,
        target_band: Option<&str>,
    ) -> Result<SteerCommand> {
        let mac: MacAddress = sta_mac.parse()?;
        let decision = self
            .steering
            .decide(&mac, &AssetUid::from(target), target_ssid, target_band)
            .await?;
        self.channel.send_steer(&decision).await?;
        Ok(decision.command)
    }

    /// Removes an asset: network document entry, effective document,
    /// identity and pending push. Idempotent.
    ///
    /// # Errors
    /// - `ApplyFailed`: the document without the asset was rejected
    /// - store or save failures
    pub async fn deprovision(&self, uid: &AssetUid) -> Result<()> {
        let _guard = self.config.acquire_lock().await;
        let mut doc = self.config.active_config().await;
        if doc.assets.remove(uid).is_some() {
            let errors = self.config.try_apply(doc.clone()).await;
            if !errors.is_empty() {
                return Err(ServerError::ApplyFailed { errors });
            }
            self.config.save(&doc).await?;
        }
        self.effective.delete(uid).await?;
        info!(uid = %uid, "Asset deprovisioned");
        Ok(())
    }

    /// Fresh station records.
    ///
    /// # Errors
    /// Fails if the status store cannot be read.
    pub async fn stations(&self) -> Result<Vec<StationStatus>> {
        self.status.get_all_stations().await
    }

    /// Status of every registered asset.
    ///
    /// # Errors
    /// Fails if the status store cannot be read.
    pub async fn asset_statuses(&self) -> Result<Vec<AssetStatus>> {
        self.status.get_all_asset_status().await
    }

    /// Cancels every pending push. Later push requests are ignored.
    pub fn shutdown(&self) {
        self.scheduler.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    use serde_json::json;
    use wisp_common::TunnelPublicKey;

    use crate::management::{MemoryStore, Namespace, StaticPeerTable};

    fn tunnel() -> ControllerTunnel {
        ControllerTunnel {
            public_key: None,
            controller_ip: "10.8.0.1".parse().unwrap(),
            listen_port: 51820,
            endpoint: None,
        }
    }

    fn key(byte: u8) -> TunnelPublicKey {
        TunnelPublicKey::from_bytes([byte; 32])
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_restores_without_repush() {
        let dir = tempfile::tempdir().unwrap();
        let network = dir.path().join("network.json");
        let doc = json!({
            "assets": {"ap-1": {"templateId": "default_ap", "publicKey": key(1).as_str()}},
            "templates": {"default_ap": {}}
        });
        tokio::fs::write(&network, doc.to_string()).await.unwrap();

        let store = Arc::new(MemoryStore::new());
        store
            .set(Namespace::EffectiveConfig, "ap-1", json!({"publicKey": key(1).as_str(), "_ts": 1}))
            .await
            .unwrap();
        let peers = Arc::new(StaticPeerTable::default());
        peers.adopt(key(1), "10.8.0.7".parse().unwrap());

        let settings = ControllerSettings {
            network_config_file: Some(network),
            ..ControllerSettings::default()
        };
        let (controller, _ready) = Controller::open(
            settings,
            store as Arc<dyn HashStore>,
            peers as Arc<dyn PeerTable>,
            tunnel(),
        )
        .await
        .unwrap();

        let uid = AssetUid::from("ap-1");
        assert_eq!(
            controller.identity().resolve_ip_by_uid(&uid),
            Some(IpAddr::from([10, 8, 0, 7]))
        );
        assert_eq!(controller.effective().timestamp_of(&uid).map(|t| t.as_millis()), Some(1));
        assert!(!controller.scheduler().is_pending(&uid));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_drops_assets_missing_from_document() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(Namespace::EffectiveConfig, "ap-9", json!({"publicKey": key(9).as_str(), "_ts": 1}))
            .await
            .unwrap();

        let (controller, _ready) = Controller::open(
            ControllerSettings::default(),
            store as Arc<dyn HashStore>,
            Arc::new(StaticPeerTable::default()) as Arc<dyn PeerTable>,
            tunnel(),
        )
        .await
        .unwrap();

        assert!(!controller.identity().contains("ap-9"));
        assert!(controller.effective().get(&"ap-9".into()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deprovision_is_idempotent() {
        let peers = Arc::new(StaticPeerTable::default());
        let (controller, _ready) = Controller::open(
            ControllerSettings::default(),
            Arc::new(MemoryStore::new()) as Arc<dyn HashStore>,
            Arc::clone(&peers) as Arc<dyn PeerTable>,
            tunnel(),
        )
        .await
        .unwrap();

        peers.adopt(key(1), IpAddr::from([10, 8, 0, 7]));
        assert_eq!(controller.refresh_peers().await.unwrap(), 1);

        let register = json!({"type": "raw_auth_register", "uid": "ap-1", "publicKey": key(1).as_str()});
        controller
            .channel()
            .handle_raw_datagram(register.to_string().as_bytes(), "203.0.113.9:5000".parse().unwrap())
            .await;
        assert!(controller.identity().contains("ap-1"));
        assert!(controller.scheduler().is_pending(&"ap-1".into()));

        let uid = AssetUid::from("ap-1");
        controller.deprovision(&uid).await.unwrap();
        controller.deprovision(&uid).await.unwrap();

        assert!(!controller.identity().contains("ap-1"));
        assert!(!controller.scheduler().is_pending(&uid));
        assert!(controller.config().active_config().await.assets.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_steer_rejects_bad_mac() {
        let (controller, _ready) = Controller::open(
            ControllerSettings::default(),
            Arc::new(MemoryStore::new()) as Arc<dyn HashStore>,
            Arc::new(StaticPeerTable::default()) as Arc<dyn PeerTable>,
            tunnel(),
        )
        .await
        .unwrap();
        assert!(controller.steer("not-a-mac", "ap-2", None, None).await.is_err());
        assert!(matches!(
            controller.steer("AA:BB:CC:DD:EE:FF", "ap-2", None, None).await,
            Err(ServerError::StationUnknown(_))
        ));
    }
}

// ============================================
// File: crates/wisp-server/src/handlers/control.rs
// ============================================
//! # Control Channel Handler
//!
//! ## Creation Reason
//! Dispatches inbound datagrams from both listeners and drives every
//! controller→asset message.
//!
//! ## Main Functionality
//! - `handle_control_datagram`: authenticated channel (tunnel side)
//! - `handle_raw_datagram`: pre-tunnel auth channel
//! - `send_push` / `send_heartbeats` / `send_steer`: outbound traffic
//! - `run_push_worker`: drains fired push timers
//!
//! ## Dispatch
//! ```text
//! ┌──────────────────┬─────────────┬──────────────────────────────────┐
//! │ type             │ channel     │ effect                           │
//! ├──────────────────┼─────────────┼──────────────────────────────────┤
//! │ pull_config      │ control     │ resolve uid, schedule push       │
//! │ status           │ control     │ resolve uid, record station+asset│
//! │ auth_register    │ control     │ AuthHandshake (peer key first)   │
//! │ raw_auth_register│ raw         │ AuthHandshake, maybe grant       │
//! │ outbound types   │ either      │ dropped                          │
//! └──────────────────┴─────────────┴──────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Nothing here returns an error to the datagram's sender; every failure
//!   is logged by category and the datagram is dropped
//! - The uid of control traffic always comes from the source address,
//!   never from the payload (auth_register excepted)
//! - Transports are swapped by the listener supervisor on restart; always
//!   read the current one rather than caching it
//!
//! ## Last Modified
//! v0.1.0 - Initial control channel

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, trace, warn};

use wisp_common::AssetUid;
use wisp_core::protocol::{ControlMessage, DatagramCodec, StatusReport};
use wisp_transport::{Transport, TransportError};

use crate::error::{Result, ServerError};
use crate::services::{
    AuthHandshake, ControllerTunnel, EffectiveConfigStore, IdentityRegistry, PushScheduler,
    StatusAggregator, SteerDecision,
};

/// Which listener a datagram arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Authenticated control channel.
    Control,
    /// Pre-tunnel raw auth channel.
    Raw,
}

impl Channel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Raw => "raw",
        }
    }
}

/// Services the control channel drives.
#[derive(Clone)]
pub struct ChannelServices {
    /// Identity registry.
    pub identity: Arc<IdentityRegistry>,
    /// Committed per-asset documents.
    pub effective: Arc<EffectiveConfigStore>,
    /// Push timers.
    pub scheduler: Arc<PushScheduler>,
    /// Status ingestion.
    pub status: Arc<StatusAggregator>,
    /// Registration.
    pub auth: Arc<AuthHandshake>,
    /// Controller tunnel parameters.
    pub tunnel: Arc<ControllerTunnel>,
}

/// Control channel protocol handler.
pub struct ControlChannel {
    services: ChannelServices,
    asset_port: u16,
    control: RwLock<Option<Arc<dyn Transport>>>,
    raw: RwLock<Option<Arc<dyn Transport>>>,
}

impl ControlChannel {
    /// Creates a detached handler. Assets receive its messages on
    /// `asset_port` at their tunnel IP.
    #[must_use]
    pub fn new(services: ChannelServices, asset_port: u16) -> Self {
        Self {
            services,
            asset_port,
            control: RwLock::new(None),
            raw: RwLock::new(None),
        }
    }

    // ========================================
    // Transport management
    // ========================================

    /// Installs freshly bound transports.
    pub fn attach(&self, control: Arc<dyn Transport>, raw: Arc<dyn Transport>) {
        *self.control.write() = Some(control);
        *self.raw.write() = Some(raw);
    }

    /// Removes the transports, returning them for shutdown.
    pub fn detach(&self) -> Vec<Arc<dyn Transport>> {
        [self.control.write().take(), self.raw.write().take()]
            .into_iter()
            .flatten()
            .collect()
    }

    /// Returns `true` if both transports are installed.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.control.read().is_some() && self.raw.read().is_some()
    }

    fn transport(&self, channel: Channel) -> Result<Arc<dyn Transport>> {
        let slot = match channel {
            Channel::Control => &self.control,
            Channel::Raw => &self.raw,
        };
        slot.read()
            .clone()
            .ok_or(ServerError::Transport(TransportError::ShuttingDown))
    }

    // ========================================
    // Inbound
    // ========================================

    /// Handles one datagram from the control listener.
    pub async fn handle_control_datagram(&self, payload: &[u8], source: SocketAddr) {
        if let Err(e) = self.process(Channel::Control, payload, source).await {
            log_failure(Channel::Control, source, &e);
        }
    }

    /// Handles one datagram from the raw auth listener.
    pub async fn handle_raw_datagram(&self, payload: &[u8], source: SocketAddr) {
        if let Err(e) = self.process(Channel::Raw, payload, source).await {
            log_failure(Channel::Raw, source, &e);
        }
    }

    async fn process(&self, channel: Channel, payload: &[u8], source: SocketAddr) -> Result<()> {
        let message = DatagramCodec::decode(payload)?;
        trace!(channel = channel.as_str(), peer = %source, msg_type = %message.message_type(), "Datagram received");

        match (channel, message) {
            (Channel::Control, ControlMessage::PullConfig) => {
                let uid = self.resolve(source)?;
                self.services.scheduler.schedule(&uid);
                debug!(uid = %uid, "Config pull requested");
                Ok(())
            }
            (Channel::Control, ControlMessage::Status(report)) => {
                let uid = self.resolve(source)?;
                self.record_status(&report, &uid).await
            }
            (Channel::Control, ControlMessage::AuthRegister { uid, public_key }) => {
                let key = self
                    .services
                    .identity
                    .public_key_at(source.ip())
                    .or(public_key)
                    .ok_or(ServerError::IncompleteRequest { field: "publicKey" })?;
                self.services.auth.process_auth_register(&uid, &key, None).await?;
                Ok(())
            }
            (
                Channel::Raw,
                ControlMessage::RawAuthRegister {
                    uid,
                    public_key,
                    device_type,
                },
            ) => {
                let grant = self
                    .services
                    .auth
                    .process_raw_auth_message(uid, public_key, device_type.as_deref(), source)
                    .await?;
                if let Some(grant) = grant {
                    self.send(Channel::Raw, &ControlMessage::RawAuthGrant(grant), source).await?;
                }
                Ok(())
            }
            (
                channel,
                message @ (ControlMessage::PullConfig
                | ControlMessage::Status(_)
                | ControlMessage::AuthRegister { .. }
                | ControlMessage::RawAuthRegister { .. }
                | ControlMessage::PushConfig { .. }
                | ControlMessage::Heartbeat { .. }
                | ControlMessage::Steer(_)
                | ControlMessage::RawAuthGrant(_)),
            ) => {
                debug!(
                    channel = channel.as_str(),
                    peer = %source,
                    msg_type = %message.message_type(),
                    "Message not accepted on this channel, dropped"
                );
                Ok(())
            }
        }
    }

    async fn record_status(&self, report: &StatusReport, uid: &AssetUid) -> Result<()> {
        let stations = self.services.status.record_station_status(report, uid).await?;
        self.services.status.record_asset_status(report, uid).await?;
        trace!(uid = %uid, stations, "Status recorded");
        Ok(())
    }

    fn resolve(&self, source: SocketAddr) -> Result<AssetUid> {
        self.services
            .identity
            .resolve_uid_by_address(source.ip())
            .ok_or_else(|| ServerError::UnknownAsset {
                addr: source.ip().to_string(),
            })
    }

    // ========================================
    // Outbound
    // ========================================

    /// Pushes the committed document of `uid` with tunnel parameters.
    ///
    /// Does nothing if the document is gone or the asset has no tunnel IP
    /// yet; the asset pulls once its tunnel is up.
    ///
    /// # Errors
    /// Fails if encoding or the send fails.
    pub async fn send_push(&self, uid: &AssetUid) -> Result<()> {
        let Some(config) = self.services.effective.get(uid) else {
            debug!(uid = %uid, "Push skipped, no effective configuration");
            return Ok(());
        };
        let Some(ip) = self.services.identity.resolve_ip_by_uid(uid) else {
            debug!(uid = %uid, "Push skipped, asset has no tunnel IP yet");
            return Ok(());
        };

        let tunnel = self
            .services
            .tunnel
            .params_for(Some(ip), self.services.identity.private_key_override(uid));
        let message = ControlMessage::PushConfig { config, tunnel };
        self.send(Channel::Control, &message, self.asset_addr(ip)).await?;

        info!(uid = %uid, tunnel_ip = %ip, "Configuration pushed");
        Ok(())
    }

    /// Sends a heartbeat to every registered asset with a committed
    /// document. Returns how many were sent.
    pub async fn send_heartbeats(&self) -> usize {
        let mut sent = 0;
        for uid in self.services.identity.uids() {
            let Some(ts) = self.services.effective.timestamp_of(&uid) else {
                continue;
            };
            let Some(ip) = self.services.identity.resolve_ip_by_uid(&uid) else {
                continue;
            };
            match self
                .send(Channel::Control, &ControlMessage::Heartbeat { ts }, self.asset_addr(ip))
                .await
            {
                Ok(()) => sent += 1,
                Err(e) => warn!(uid = %uid, error = %e, "Heartbeat send failed"),
            }
        }
        debug!(sent, "Heartbeats sent");
        sent
    }

    /// Sends a steering command to the asset currently serving the station.
    ///
    /// # Errors
    /// - `UnknownAsset`: the serving asset has no tunnel IP
    /// - transport failures
    pub async fn send_steer(&self, decision: &SteerDecision) -> Result<()> {
        let ip = self
            .services
            .identity
            .resolve_ip_by_uid(&decision.via)
            .ok_or_else(|| ServerError::UnknownAsset {
                addr: decision.via.to_string(),
            })?;
        self.send(
            Channel::Control,
            &ControlMessage::Steer(decision.command.clone()),
            self.asset_addr(ip),
        )
        .await?;

        info!(
            via = %decision.via,
            sta = %decision.command.sta_mac,
            bssid = %decision.command.dst_bssid,
            channel = decision.command.dst_channel,
            "Steer command sent"
        );
        Ok(())
    }

    /// Sends every uid fired by the push scheduler until shutdown.
    pub async fn run_push_worker(
        self: Arc<Self>,
        mut ready: mpsc::UnboundedReceiver<AssetUid>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("Push worker shutting down");
                    break;
                }
                next = ready.recv() => {
                    let Some(uid) = next else { break };
                    if let Err(e) = self.send_push(&uid).await {
                        warn!(uid = %uid, error = %e, "Push failed");
                    }
                }
            }
        }
    }

    async fn send(&self, channel: Channel, message: &ControlMessage, dest: SocketAddr) -> Result<()> {
        let bytes = DatagramCodec::encode(message)?;
        self.transport(channel)?.send(&bytes, &dest).await?;
        trace!(channel = channel.as_str(), dest = %dest, msg_type = %message.message_type(), "Datagram sent");
        Ok(())
    }

    fn asset_addr(&self, ip: std::net::IpAddr) -> SocketAddr {
        SocketAddr::new(ip, self.asset_port)
    }
}

fn log_failure(channel: Channel, source: SocketAddr, err: &ServerError) {
    let channel = channel.as_str();
    match err {
        ServerError::Core(e) if e.is_parse_error() => {
            debug!(channel, peer = %source, error = %e, "Malformed datagram dropped");
        }
        ServerError::UnknownAsset { .. } => {
            warn!(channel, peer = %source, error = %err, "Datagram from unknown asset dropped");
        }
        ServerError::ApplyFailed { .. } | ServerError::InvalidDocument { .. } => {
            warn!(channel, peer = %source, error = %err, "Registration aborted");
        }
        e if e.is_drop() => {
            debug!(channel, peer = %source, error = %e, "Datagram dropped");
        }
        e => {
            error!(channel, peer = %source, error = %e, "Datagram handling failed");
        }
    }
}

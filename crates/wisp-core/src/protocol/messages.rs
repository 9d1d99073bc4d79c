// ============================================
// File: crates/wisp-core/src/protocol/messages.rs
// ============================================
//! # Protocol Messages
//!
//! ## Creation Reason
//! Defines the closed set of messages exchanged with assets. Every inbound
//! datagram decodes into exactly one [`ControlMessage`] variant, so
//! dispatch is an exhaustive `match` rather than probing payload shape.
//!
//! ## Main Functionality
//! - `MessageType`: wire discriminator, used for logging and decode errors
//! - `ControlMessage`: tagged enum of all messages
//! - Payloads: `StatusReport`, `TunnelParams`, `SteerCommand`, `RawAuthGrant`
//!
//! ## ⚠️ Important Note for Next Developer
//! - `MessageType::ALL` and `ControlMessage` must list the same types
//! - `TunnelParams::private_key` is the only secret that ever goes on the wire
//!
//! ## Last Modified
//! v0.1.0 - Initial message definitions

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use wisp_common::{AssetUid, MacAddress, Timestamp, TunnelPrivateKey, TunnelPublicKey};

// ============================================
// MessageType
// ============================================

/// Wire discriminator carried in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Asset asks for its effective configuration.
    PullConfig,
    /// Asset reports health and associated stations.
    Status,
    /// Asset confirms its key binding over the control channel.
    AuthRegister,
    /// Controller delivers configuration and tunnel parameters.
    PushConfig,
    /// Controller announces the current configuration version.
    Heartbeat,
    /// Controller instructs a station hand-off.
    Steer,
    /// Unprovisioned asset requests adoption.
    RawAuthRegister,
    /// Controller grants tunnel parameters to an adopted asset.
    RawAuthGrant,
}

impl MessageType {
    /// Every message type, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::PullConfig,
        Self::Status,
        Self::AuthRegister,
        Self::PushConfig,
        Self::Heartbeat,
        Self::Steer,
        Self::RawAuthRegister,
        Self::RawAuthGrant,
    ];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PullConfig => "pull_config",
            Self::Status => "status",
            Self::AuthRegister => "auth_register",
            Self::PushConfig => "push_config",
            Self::Heartbeat => "heartbeat",
            Self::Steer => "steer",
            Self::RawAuthRegister => "raw_auth_register",
            Self::RawAuthGrant => "raw_auth_grant",
        }
    }

    /// Looks up a type by its wire name.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// ControlMessage
// ============================================

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// `{"type":"pull_config"}`
    PullConfig,

    /// Periodic status snapshot from an asset.
    Status(StatusReport),

    /// Post-tunnel registration.
    AuthRegister {
        /// Asset identifier
        uid: AssetUid,
        /// Key claimed by the asset; the peer table entry for the source
        /// address takes precedence when it resolves
        #[serde(rename = "publicKey", default, skip_serializing_if = "Option::is_none")]
        public_key: Option<TunnelPublicKey>,
    },

    /// Effective configuration plus tunnel channel parameters.
    PushConfig {
        /// Effective configuration document, including `_ts`
        config: Value,
        /// Tunnel parameters for the receiving asset
        tunnel: TunnelParams,
    },

    /// Configuration version announcement.
    Heartbeat {
        /// `_ts` of the asset's effective configuration
        ts: Timestamp,
    },

    /// Station hand-off instruction for the station's current asset.
    Steer(SteerCommand),

    /// Pre-tunnel registration. Both `uid` and `publicKey` are required
    /// for the request to be processed; they are optional here so that a
    /// partial request decodes and is rejected with a precise reason.
    RawAuthRegister {
        /// Asset identifier
        #[serde(default)]
        uid: Option<AssetUid>,
        /// Asset tunnel public key
        #[serde(rename = "publicKey", default)]
        public_key: Option<TunnelPublicKey>,
        /// Device type used to pick a default template
        #[serde(rename = "deviceType", default, skip_serializing_if = "Option::is_none")]
        device_type: Option<String>,
    },

    /// Reply to a raw registration once the asset is an adopted peer.
    RawAuthGrant(RawAuthGrant),
}

impl ControlMessage {
    /// Returns the wire discriminator of this message.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::PullConfig => MessageType::PullConfig,
            Self::Status(_) => MessageType::Status,
            Self::AuthRegister { .. } => MessageType::AuthRegister,
            Self::PushConfig { .. } => MessageType::PushConfig,
            Self::Heartbeat { .. } => MessageType::Heartbeat,
            Self::Steer(_) => MessageType::Steer,
            Self::RawAuthRegister { .. } => MessageType::RawAuthRegister,
            Self::RawAuthGrant(_) => MessageType::RawAuthGrant,
        }
    }
}

// ============================================
// Status
// ============================================

/// Status snapshot sent by an asset.
///
/// Fields the controller does not interpret are kept as raw JSON so they
/// can be reported back verbatim through the management surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Asset's own hardware address, used as the asset status key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Seconds since boot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_uptime: Option<u64>,
    /// Seconds since the agent process started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_uptime: Option<u64>,
    /// Agent firmware version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Per-radio utilization, opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_utilization: Option<Value>,
    /// WAN uplink mode, opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wan_mode: Option<Value>,
    /// Mesh upstream access points, opaque
    #[serde(rename = "upstreamAPs", default, skip_serializing_if = "Vec::is_empty")]
    pub upstream_aps: Vec<Value>,
    /// Advertised access points per SSID
    #[serde(default)]
    pub ssids: BTreeMap<String, Vec<BssInfo>>,
    /// Currently associated stations
    #[serde(default)]
    pub stations: Vec<StationEntry>,
}

impl StatusReport {
    /// Finds the advertised BSS for `ssid` on interface `intf`.
    #[must_use]
    pub fn find_bss(&self, ssid: &str, intf: &str) -> Option<&BssInfo> {
        self.ssids.get(ssid)?.iter().find(|bss| bss.intf == intf)
    }
}

/// One access point (BSS) an asset advertises for an SSID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BssInfo {
    /// Wireless interface name, e.g. `wlan1`
    pub intf: String,
    /// BSSID
    pub bssid: String,
    /// Band label, e.g. `2.4g` or `5g`
    pub band: String,
    /// Operating channel
    pub channel: u32,
}

/// A station associated with the reporting asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationEntry {
    /// Station hardware address
    pub mac: MacAddress,
    /// SSID the station is associated to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    /// Interface the station is associated on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intf: Option<String>,
    /// Device fields (signal, rates, hostname, ...)
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

// ============================================
// Outbound Payloads
// ============================================

/// Tunnel channel parameters carried in `push_config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelParams {
    /// Controller public key, absent if it could not be derived
    #[serde(rename = "publicKey")]
    pub public_key: Option<TunnelPublicKey>,
    /// Controller tunnel address
    #[serde(rename = "controllerIP")]
    pub controller_ip: IpAddr,
    /// Controller tunnel listen port
    #[serde(rename = "listenPort")]
    pub listen_port: u16,
    /// Private key override assigned to this asset, if any
    #[serde(rename = "privateKey", default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<TunnelPrivateKey>,
    /// Asset tunnel address
    #[serde(rename = "tunnelIP")]
    pub tunnel_ip: Option<IpAddr>,
    /// Public `host:port` of the controller tunnel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Steering instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteerCommand {
    /// Station to move
    #[serde(rename = "staMac")]
    pub sta_mac: MacAddress,
    /// Destination BSSID
    #[serde(rename = "dstBSSID")]
    pub dst_bssid: String,
    /// Destination channel
    #[serde(rename = "dstChannel")]
    pub dst_channel: u32,
}

/// Grant sent on the raw channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAuthGrant {
    /// Controller public key
    #[serde(rename = "publicKey")]
    pub public_key: TunnelPublicKey,
    /// Controller tunnel address
    #[serde(rename = "controllerIP")]
    pub controller_ip: IpAddr,
    /// Tunnel address assigned to the asset
    #[serde(rename = "tunnelIP")]
    pub tunnel_ip: IpAddr,
    /// Controller tunnel listen port
    #[serde(rename = "listenPort")]
    pub listen_port: u16,
    /// Public `host:port` of the controller tunnel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

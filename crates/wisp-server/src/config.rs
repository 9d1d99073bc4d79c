// ============================================
// File: crates/wisp-server/src/config.rs
// ============================================
//! # Server Configuration
//!
//! ## Creation Reason
//! Loads and validates the controller's TOML configuration.
//!
//! ## Configuration Sections
//! - `network`: control and raw auth listen addresses, asset port
//! - `tunnel`: controller tunnel address, key material, peer table
//! - `control`: heartbeat, debounce, TTL and restart timing
//! - `storage`: persistence locations
//! - `logging`: log level
//!
//! ## Example Configuration
//! ```toml
//! [network]
//! control_port = 7700
//! raw_auth_addr = "0.0.0.0:7701"
//!
//! [tunnel]
//! controller_ip = "10.8.0.1"
//! listen_port = 51820
//! public_endpoint = "vpn.example.net:51820"
//! private_key_file = "/etc/wisp/controller.key"
//! peers_file = "/etc/wisp/peers.json"
//!
//! [control]
//! heartbeat_interval_secs = 30
//! push_debounce_ms = 2000
//!
//! [storage]
//! data_dir = "/var/lib/wisp"
//! network_config_file = "/etc/wisp/network.json"
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - All config changes require server restart
//! - The control listener binds `tunnel.controller_ip`, not `0.0.0.0`;
//!   only tunnel peers may reach it
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, ServerError};

// ============================================
// ServerConfig
// ============================================

/// Main server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listener configuration.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Secure tunnel parameters.
    #[serde(default)]
    pub tunnel: TunnelConfig,

    /// Protocol timing.
    #[serde(default)]
    pub control: ControlConfig,

    /// Persistence locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        let config: Self =
            toml::from_str(&content).map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Parses configuration from a string (useful for testing).
    ///
    /// # Errors
    /// Returns error if parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ServerError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.tunnel.validate()?;
        self.control.validate()?;
        Ok(())
    }

    /// Address the authenticated control listener binds.
    #[must_use]
    pub fn control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.tunnel.controller_ip, self.network.control_port)
    }

    /// Address outbound control messages are sent to for a tunnel IP.
    #[must_use]
    pub fn asset_addr(&self, tunnel_ip: IpAddr) -> SocketAddr {
        SocketAddr::new(tunnel_ip, self.network.asset_port)
    }
}

// ============================================
// NetworkConfig
// ============================================

/// Listener configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Control listener port, bound on `tunnel.controller_ip`.
    #[serde(default = "default_control_port")]
    pub control_port: u16,

    /// Raw auth listener address.
    #[serde(default = "default_raw_auth_addr")]
    pub raw_auth_addr: SocketAddr,

    /// Port assets receive control messages on.
    #[serde(default = "default_control_port")]
    pub asset_port: u16,
}

const fn default_control_port() -> u16 {
    7700
}

fn default_raw_auth_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 7701)
}

impl NetworkConfig {
    fn validate(&self) -> Result<()> {
        if self.control_port == 0 {
            return Err(ServerError::config_invalid("network.control_port", "port cannot be 0"));
        }
        if self.asset_port == 0 {
            return Err(ServerError::config_invalid("network.asset_port", "port cannot be 0"));
        }
        if self.raw_auth_addr.port() == 0 {
            return Err(ServerError::config_invalid("network.raw_auth_addr", "port cannot be 0"));
        }
        Ok(())
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            control_port: default_control_port(),
            raw_auth_addr: default_raw_auth_addr(),
            asset_port: default_control_port(),
        }
    }
}

// ============================================
// TunnelConfig
// ============================================

/// Secure tunnel section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Controller address inside the tunnel.
    #[serde(default = "default_controller_ip")]
    pub controller_ip: IpAddr,

    /// Tunnel listen port handed to assets.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Public `host:port` of the tunnel endpoint handed to assets.
    #[serde(default)]
    pub public_endpoint: Option<String>,

    /// File holding the base64 controller private key.
    #[serde(default = "default_private_key_file")]
    pub private_key_file: PathBuf,

    /// JSON peer table maintained by the tunnel provisioner.
    #[serde(default = "default_peers_file")]
    pub peers_file: PathBuf,

    /// Command reading a private key on stdin and printing the public key.
    /// Empty means derive in-process.
    #[serde(default = "default_pubkey_command")]
    pub pubkey_command: Vec<String>,
}

fn default_controller_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 8, 0, 1))
}

const fn default_listen_port() -> u16 {
    51820
}

fn default_private_key_file() -> PathBuf {
    PathBuf::from("/etc/wisp/controller.key")
}

fn default_peers_file() -> PathBuf {
    PathBuf::from("/etc/wisp/peers.json")
}

fn default_pubkey_command() -> Vec<String> {
    vec!["wg".to_string(), "pubkey".to_string()]
}

impl TunnelConfig {
    fn validate(&self) -> Result<()> {
        if self.listen_port == 0 {
            return Err(ServerError::config_invalid("tunnel.listen_port", "port cannot be 0"));
        }
        if self.controller_ip.is_unspecified() {
            return Err(ServerError::config_invalid(
                "tunnel.controller_ip",
                "must be the controller's tunnel address",
            ));
        }
        if let Some(endpoint) = &self.public_endpoint {
            if !endpoint.contains(':') {
                return Err(ServerError::config_invalid(
                    "tunnel.public_endpoint",
                    "must be host:port",
                ));
            }
        }
        Ok(())
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            controller_ip: default_controller_ip(),
            listen_port: default_listen_port(),
            public_endpoint: None,
            private_key_file: default_private_key_file(),
            peers_file: default_peers_file(),
            pubkey_command: default_pubkey_command(),
        }
    }
}

// ============================================
// ControlConfig
// ============================================

/// Protocol timing section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Heartbeat period.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Quiet period before a scheduled push is sent.
    #[serde(default = "default_push_debounce")]
    pub push_debounce_ms: u64,

    /// Station record freshness window.
    #[serde(default = "default_station_ttl")]
    pub station_ttl_secs: u64,

    /// Peer table reload period.
    #[serde(default = "default_peer_refresh")]
    pub peer_refresh_secs: u64,

    /// First delay before rebinding failed listeners.
    #[serde(default = "default_backoff_initial")]
    pub restart_backoff_initial_ms: u64,

    /// Ceiling of the rebind delay.
    #[serde(default = "default_backoff_max")]
    pub restart_backoff_max_ms: u64,

    /// Device type assumed when a registration does not carry one.
    #[serde(default = "default_device_type")]
    pub default_device_type: String,
}

const fn default_heartbeat_interval() -> u64 {
    30
}

const fn default_push_debounce() -> u64 {
    2000
}

const fn default_station_ttl() -> u64 {
    30
}

const fn default_peer_refresh() -> u64 {
    10
}

const fn default_backoff_initial() -> u64 {
    500
}

const fn default_backoff_max() -> u64 {
    30_000
}

fn default_device_type() -> String {
    "ap".to_string()
}

impl ControlConfig {
    fn validate(&self) -> Result<()> {
        let positive = [
            ("control.heartbeat_interval_secs", self.heartbeat_interval_secs),
            ("control.push_debounce_ms", self.push_debounce_ms),
            ("control.station_ttl_secs", self.station_ttl_secs),
            ("control.peer_refresh_secs", self.peer_refresh_secs),
            ("control.restart_backoff_initial_ms", self.restart_backoff_initial_ms),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ServerError::config_invalid(field, "must be greater than 0"));
            }
        }

        if self.restart_backoff_max_ms < self.restart_backoff_initial_ms {
            return Err(ServerError::config_invalid(
                "control.restart_backoff_max_ms",
                "cannot be less than restart_backoff_initial_ms",
            ));
        }

        if self.default_device_type.trim().is_empty() {
            return Err(ServerError::config_invalid(
                "control.default_device_type",
                "cannot be empty",
            ));
        }

        Ok(())
    }

    /// Heartbeat period.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Push debounce window.
    #[must_use]
    pub const fn push_debounce(&self) -> Duration {
        Duration::from_millis(self.push_debounce_ms)
    }

    /// Station freshness window.
    #[must_use]
    pub const fn station_ttl(&self) -> Duration {
        Duration::from_secs(self.station_ttl_secs)
    }

    /// Peer table reload period.
    #[must_use]
    pub const fn peer_refresh(&self) -> Duration {
        Duration::from_secs(self.peer_refresh_secs)
    }

    /// First listener rebind delay.
    #[must_use]
    pub const fn restart_backoff_initial(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_initial_ms)
    }

    /// Listener rebind delay ceiling.
    #[must_use]
    pub const fn restart_backoff_max(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_max_ms)
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            push_debounce_ms: default_push_debounce(),
            station_ttl_secs: default_station_ttl(),
            peer_refresh_secs: default_peer_refresh(),
            restart_backoff_initial_ms: default_backoff_initial(),
            restart_backoff_max_ms: default_backoff_max(),
            default_device_type: default_device_type(),
        }
    }
}

// ============================================
// StorageConfig
// ============================================

/// Persistence section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON file per store namespace.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Network configuration document (assets and templates).
    #[serde(default = "default_network_config_file")]
    pub network_config_file: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/wisp")
}

fn default_network_config_file() -> PathBuf {
    PathBuf::from("/etc/wisp/network.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            network_config_file: default_network_config_file(),
        }
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================
// Tests
// ============================================

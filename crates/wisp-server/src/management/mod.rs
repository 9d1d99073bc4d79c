// ============================================
// File: crates/wisp-server/src/management/mod.rs
// ============================================
//! # Management Module
//!
//! ## Creation Reason
//! External state the controller reads and writes: the operator-edited
//! network document, the tunnel peer table maintained by the provisioner,
//! the controller key and the persisted hash namespaces.
//!
//! ## Main Functionality
//! - `ConfigManager` / `LocalConfigManager`: network document, lock, apply
//! - `PeerTable` / `FilePeerTable`: adopted tunnel peers and key overrides
//! - `KeyDeriver`: controller public key from the private key file
//! - `HashStore` / `JsonFileStore`: namespaced persistence
//!
//! ## Architecture
//! ```text
//!   network.json ──► LocalConfigManager ──► EffectiveConfigStore
//!   peers.json   ──► FilePeerTable      ──► IdentityRegistry (refresh)
//!   private.key  ──► KeyDeriver         ──► ControllerTunnel
//!   data_dir/*   ◄─► JsonFileStore      ◄─► effective / status services
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial management module

pub mod config;
pub mod keys;
pub mod peers;
pub mod store;

pub use config::{default_template_id, AssetEntry, ConfigManager, LocalConfigManager, NetworkDocument};
pub use keys::{deriver_for, load_controller_key, CommandKeyDeriver, KeyDeriver, X25519KeyDeriver};
pub use peers::{FilePeerTable, KeyOverride, PeerEntry, PeerSnapshot, PeerTable, StaticPeerTable};
pub use store::{HashStore, JsonFileStore, MemoryStore, Namespace};

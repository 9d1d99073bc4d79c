// ============================================
// File: crates/wisp-server/src/handlers/mod.rs
// ============================================
//! # Datagram Handlers
//!
//! ## Creation Reason
//! Protocol handling for the two asset-facing listeners.
//!
//! ### Submodules
//! - [`control`]: inbound dispatch and outbound push/heartbeat/steer/grant
//!
//! ## Data Flow
//! ```text
//! Asset → control listener:
//!   1. Decode JSON datagram, reject unknown types
//!   2. Resolve source IP → uid through the identity registry
//!   3. Dispatch: pull_config / status / auth_register
//!
//! Asset → raw listener:
//!   1. Decode raw_auth_register
//!   2. Register under the config lock
//!   3. Reply raw_auth_grant to the source once the peer is adopted
//!
//! Controller → asset (tunnel IP, asset port):
//!   push_config, heartbeat, steer
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Handlers run one task per datagram; never hold a lock across a send
//!
//! ## Last Modified
//! v0.1.0 - Initial handlers structure

pub mod control;

pub use control::{Channel, ChannelServices, ControlChannel};

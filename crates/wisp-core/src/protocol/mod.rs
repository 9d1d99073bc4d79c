// ============================================
// File: crates/wisp-core/src/protocol/mod.rs
// ============================================
//! # Protocol Module
//!
//! ## Creation Reason
//! Defines the JSON datagram protocol spoken between the controller and
//! managed access points on both the raw auth channel and the control
//! channel.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`messages`]: Message enum and payload structures
//! - [`codec`]: Datagram decoding, encoding and type peeking
//!
//! ### Message Types
//! | type | direction | channel |
//! |---|---|---|
//! | `pull_config` | asset → controller | control |
//! | `status` | asset → controller | control |
//! | `auth_register` | asset → controller | control |
//! | `push_config` | controller → asset | control |
//! | `heartbeat` | controller → asset | control |
//! | `steer` | controller → asset | control |
//! | `raw_auth_register` | asset → controller | raw |
//! | `raw_auth_grant` | controller → asset | raw |
//!
//! ## Wire Format Principles
//! - One UTF-8 JSON object per datagram
//! - Discriminated by a string `type` field
//! - Field names are camelCase, matching the asset firmware
//!
//! ## ⚠️ Important Note for Next Developer
//! - Field renames break deployed firmware; add fields as `Option` instead
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol definitions

pub mod codec;
pub mod messages;

pub use codec::DatagramCodec;
pub use messages::{
    BssInfo, ControlMessage, MessageType, RawAuthGrant, StationEntry, StatusReport,
    SteerCommand, TunnelParams,
};

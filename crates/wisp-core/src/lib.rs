// ============================================
// File: crates/wisp-core/src/lib.rs
// ============================================
//! # Wisp Core - Control Protocol Library
//!
//! ## Creation Reason
//! Holds everything about the asset control protocol that does not depend
//! on sockets or controller state: the closed set of message types, the
//! JSON datagram codec, and tunnel key derivation.
//!
//! ## Main Functionality
//! - [`protocol`]: `ControlMessage` and its payloads, codec, type peeking
//! - [`crypto`]: Curve25519 public key derivation for the controller key
//! - [`error`]: Core error types
//!
//! ## Protocol Overview
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Raw auth channel (pre-tunnel, unauthenticated)              │
//! │   Asset ── raw_auth_register {uid, publicKey} ─────► Ctrl   │
//! │   Asset ◄──────────── raw_auth_grant (once adopted) ─ Ctrl   │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Control channel (inside tunnel)                             │
//! │   Asset ── auth_register / pull_config / status ───► Ctrl   │
//! │   Asset ◄──────── push_config / heartbeat / steer ── Ctrl   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - One JSON object per datagram, no framing
//! - Adding a message type means adding a `MessageType` variant AND a
//!   `ControlMessage` variant; the dispatcher matches exhaustively
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod crypto;
pub mod error;
pub mod protocol;

pub use error::{CoreError, Result};
pub use protocol::{ControlMessage, MessageType};

// ============================================
// File: crates/wisp-transport/src/lib.rs
// ============================================
//! # Wisp Transport - Datagram I/O Layer
//!
//! ## Creation Reason
//! The controller talks to assets over two UDP listeners (raw auth and
//! control). Everything above this crate sees them through the
//! [`Transport`] trait so handlers can be driven by an in-memory double.
//!
//! ## Main Functionality
//! - [`traits`]: `Transport` trait and `PacketSource`
//! - [`udp`]: tokio/socket2 UDP implementation
//! - [`mock`]: recording in-memory transport (tests, `mock` feature)
//! - [`error`]: Transport-specific error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                wisp-server                          │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │     wisp-core          wisp-transport               │
//! │         │              You are here ◄──             │
//! │         ▼              (no internal deps)           │
//! │    wisp-common                                      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Datagrams are unacknowledged; retry belongs to the asset
//! - Always use traits for testability
//! - Mock implementations available with `mock` feature
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod traits;
pub mod udp;

pub use error::{Result, TransportError};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockTransport;
pub use traits::{PacketSource, Transport, MAX_DATAGRAM_SIZE};
pub use udp::UdpTransport;

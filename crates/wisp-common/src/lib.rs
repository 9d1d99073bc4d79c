// ============================================
// File: crates/wisp-common/src/lib.rs
// ============================================
//! # Wisp Common - Shared Types Library
//!
//! ## Creation Reason
//! Provides the identifier, key and time types shared by every wisp crate,
//! so an asset uid or a tunnel public key means the same thing in the
//! protocol codec, the transport and the controller services.
//!
//! ## Main Functionality
//! - [`types`]: `AssetUid`, `MacAddress`, `TunnelPublicKey`, `TunnelPrivateKey`
//! - [`time`]: Millisecond Unix timestamps used for `_ts` and observation stamps
//! - [`error`]: Common error types and result aliases
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                wisp-server                          │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                    │
//! │         ▼                     ▼                    │
//! │     wisp-core          wisp-transport              │
//! │         │                     │                    │
//! │         └──────────┬──────────┘                    │
//! │                    ▼                               │
//! │              wisp-common  ◄── You are here        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This crate is the foundation - changes affect everything
//! - Private key material must stay inside `TunnelPrivateKey` (zeroized on drop)
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod time;
pub mod types;

pub use error::{CommonError, Result};
pub use time::Timestamp;
pub use types::{AssetUid, MacAddress, TunnelPrivateKey, TunnelPublicKey};

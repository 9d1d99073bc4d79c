// ============================================
// File: crates/wisp-server/src/services/mod.rs
// ============================================
//! # Controller Services
//!
//! ## Creation Reason
//! Business logic of the control plane, kept apart from sockets and the
//! wire codec so every service can be driven directly in tests.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`identity`]: uid ↔ public key ↔ tunnel IP bindings
//! - [`push`]: Per-uid debounced push timers
//! - [`effective_config`]: Committed per-asset documents
//! - [`status`]: Station and asset status with TTL and orphan purge
//! - [`steering`]: BSS steering decisions
//! - [`auth`]: Raw and tunnel-side registration
//!
//! ## Service Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Service Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐   ┌─────────────────────────────────┐ │
//! │  │  AuthHandshake  │──►│   ConfigManager (management)    │ │
//! │  └────────┬────────┘   └──────────────┬──────────────────┘ │
//! │           │                           ▼                    │
//! │           │            ┌─────────────────────────────────┐ │
//! │           │            │     EffectiveConfigStore        │ │
//! │           │            │  - _ts stamping / equivalence   │ │
//! │           │            └───────┬──────────────┬──────────┘ │
//! │           ▼                    ▼              ▼            │
//! │  ┌─────────────────┐   ┌─────────────┐  ┌──────────────┐   │
//! │  │ IdentityRegistry│◄──│  (register) │  │ PushScheduler│   │
//! │  └────────┬────────┘   └─────────────┘  └──────────────┘   │
//! │           ▼                                                │
//! │  ┌─────────────────┐   ┌─────────────────────────────────┐ │
//! │  │StatusAggregator │──►│        SteeringEngine           │ │
//! │  └─────────────────┘   └─────────────────────────────────┘ │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The registry is the single answer to "who is this address"; status
//!   and config paths never trust a uid from the payload
//! - Deleting an asset goes through `EffectiveConfigStore::delete`, which
//!   also cancels its push and drops its identity
//!
//! ## Last Modified
//! v0.1.0 - Initial services structure

pub mod auth;
pub mod effective_config;
pub mod identity;
pub mod push;
pub mod status;
pub mod steering;

// Re-export primary types
pub use auth::{AuthHandshake, ControllerTunnel, Registration};
pub use effective_config::{EffectiveConfigStore, SetOutcome};
pub use identity::IdentityRegistry;
pub use push::PushScheduler;
pub use status::{AssetStatus, StationStatus, StatusAggregator};
pub use steering::{SteerDecision, SteeringEngine};

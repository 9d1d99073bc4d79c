// ============================================
// File: crates/wisp-server/src/lib.rs
// ============================================
//! # Wisp Server Library
//!
//! ## Creation Reason
//! Control plane for a fleet of managed WiFi access points ("assets"):
//! bootstraps trust before the secure tunnel exists, keeps every asset's
//! configuration in sync, ingests status and relays steering intents.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: Server configuration management
//! - [`controller`]: Owned controller state and management helpers
//! - [`server`]: Task orchestration and listener supervision
//! - [`services`]: Business logic services
//!   - [`services::identity`]: uid ↔ key ↔ tunnel IP
//!   - [`services::effective_config`]: Committed per-asset documents
//!   - [`services::push`]: Debounced push timers
//!   - [`services::status`]: Station and asset status
//!   - [`services::auth`]: Registration handshake
//!   - [`services::steering`]: BSS steering
//! - [`management`]: Network document, peer table, keys, persistence
//! - [`handlers`]: Datagram dispatch and outbound messages
//! - [`error`]: Server-specific error types
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Wisp Controller                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐    │
//! │  │   Config    │────►│   Server    │────►│ ControlChannel  │    │
//! │  │  (TOML)     │     │ Orchestrator│     │   (handlers)    │    │
//! │  └─────────────┘     └──────┬──────┘     └────────┬────────┘    │
//! │                             │                     │             │
//! │         ┌───────────────────┼───────────────────┬─┘             │
//! │         ▼                   ▼                   ▼               │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────┐        │
//! │  │  Identity   │     │  Effective  │     │   Status    │        │
//! │  │  Registry   │     │   Config    │     │ Aggregator  │        │
//! │  └─────────────┘     └─────────────┘     └─────────────┘        │
//! │                                                                 │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                     Transport Layer                             │
//! │  ┌─────────────────────┐     ┌─────────────────────────────┐    │
//! │  │  Control listener   │     │     Raw auth listener       │    │
//! │  │  (tunnel IP, UDP)   │     │     (public, UDP)           │    │
//! │  └─────────────────────┘     └─────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Configuration changes require restart (no hot-reload)
//! - The network document is the source of truth; the effective store is
//!   derived from it and rebuilt at startup
//!
//! ## Last Modified
//! v0.1.0 - Initial server library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod controller;
pub mod error;
pub mod handlers;
pub mod management;
pub mod server;
pub mod services;

// Re-export primary types
pub use config::ServerConfig;
pub use controller::{Controller, ControllerSettings};
pub use error::{Result, ServerError};
pub use server::Server;

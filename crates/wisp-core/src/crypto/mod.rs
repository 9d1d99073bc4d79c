// ============================================
// File: crates/wisp-core/src/crypto/mod.rs
// ============================================
//! # Cryptography Module
//!
//! ## Creation Reason
//! The controller never performs the tunnel handshake itself, but it
//! needs its own public key for grants and pushes. This module derives
//! it in-process from the tunnel private key.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Uses `x25519-dalek`; NEVER roll your own curve arithmetic
//!
//! ## Last Modified
//! v0.1.0 - Initial key derivation

pub mod keys;

pub use keys::derive_public_key;

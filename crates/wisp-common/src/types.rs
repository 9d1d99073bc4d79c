// ============================================
// File: crates/wisp-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Centralizes the identifiers the controller keys its state by, so that
//! normalization (MAC case, key encoding) happens once at the boundary
//! instead of at every map lookup.
//!
//! ## Main Functionality
//! - `AssetUid`: Stable external identifier of a managed access point
//! - `MacAddress`: Station hardware address, normalized to upper-case `AA:BB:..`
//! - `TunnelPublicKey`: Base64 Curve25519 public key of a tunnel peer
//! - `TunnelPrivateKey`: Base64 Curve25519 private key, zeroized on drop
//!
//! ## ⚠️ Important Note for Next Developer
//! - zeroize 1.3 has no `ZeroizeOnDrop` derive, `TunnelPrivateKey` zeroizes in a manual `Drop`
//! - `TunnelPrivateKey` must never appear in `Debug` output
//! - Station MACs are compared after normalization only
//!
//! ## Last Modified
//! v0.1.0 - Initial types

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::CommonError;

/// Size of a Curve25519 key in bytes.
pub const KEY_SIZE: usize = 32;

// ============================================
// AssetUid
// ============================================

/// Stable external identifier of an asset (typically its MAC).
///
/// The uid is opaque to the controller; it is compared byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetUid(String);

impl AssetUid {
    /// Creates a uid from any string-like value.
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    /// Returns the uid as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetUid {
    fn from(uid: &str) -> Self {
        Self(uid.to_string())
    }
}

impl From<String> for AssetUid {
    fn from(uid: String) -> Self {
        Self(uid)
    }
}

impl Borrow<str> for AssetUid {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================
// MacAddress
// ============================================

/// Hardware address of a WiFi station.
///
/// Accepts `aa:bb:cc:dd:ee:ff`, `AA-BB-CC-DD-EE-FF` or `aabbccddeeff`
/// and always renders as upper-case, colon separated.
///
/// # Example
/// ```
/// use wisp_common::types::MacAddress;
///
/// let mac: MacAddress = "aa-bb-cc-dd-ee-ff".parse().unwrap();
/// assert_eq!(mac.as_str(), "AA:BB:CC:DD:EE:FF");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(String);

impl MacAddress {
    /// Returns the normalized representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MacAddress {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s
            .trim()
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect();

        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CommonError::invalid_input(
                "mac",
                format!("'{s}' is not a 48-bit hardware address"),
            ));
        }

        let upper = hex.to_ascii_uppercase();
        let octets: Vec<&str> = (0..6).map(|i| &upper[i * 2..i * 2 + 2]).collect();
        Ok(Self(octets.join(":")))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================
// TunnelPublicKey
// ============================================

/// Base64-encoded Curve25519 public key of a tunnel peer.
///
/// The key doubles as the asset's identity on the tunnel: the peer table
/// maps it to an allowed IP, and the identity registry maps it to a uid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TunnelPublicKey(String);

impl TunnelPublicKey {
    /// Builds a key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(BASE64.encode(bytes))
    }

    /// Returns the base64 representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TunnelPublicKey {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let bytes = BASE64.decode(trimmed)?;
        if bytes.len() != KEY_SIZE {
            return Err(CommonError::invalid_length(KEY_SIZE, bytes.len()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for TunnelPublicKey {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TunnelPublicKey> for String {
    fn from(key: TunnelPublicKey) -> Self {
        key.0
    }
}

impl fmt::Display for TunnelPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================
// TunnelPrivateKey
// ============================================

/// Curve25519 private key.
///
/// Used for the controller's own key and for per-asset overrides that
/// are handed to an asset inside `push_config`.
#[derive(Clone, PartialEq, Eq)]
pub struct TunnelPrivateKey([u8; KEY_SIZE]);

impl Drop for TunnelPrivateKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl TunnelPrivateKey {
    /// Wraps raw key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encodes the key as base64, the format `wg` tooling expects.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }
}

impl FromStr for TunnelPrivateKey {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = BASE64.decode(s.trim())?;
        if bytes.len() != KEY_SIZE {
            let actual = bytes.len();
            bytes.zeroize();
            return Err(CommonError::invalid_length(KEY_SIZE, actual));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self(key))
    }
}

impl fmt::Debug for TunnelPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TunnelPrivateKey(<redacted>)")
    }
}

impl Serialize for TunnelPrivateKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for TunnelPrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_normalization() {
        let a: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        let b: MacAddress = "AA-BB-CC-DD-EE-FF".parse().unwrap();
        let c: MacAddress = "aabbccddeeff".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.to_string(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_mac_rejects_garbage() {
        assert!("aa:bb:cc".parse::<MacAddress>().is_err());
        assert!("zz:bb:cc:dd:ee:ff".parse::<MacAddress>().is_err());
        assert!(serde_json::from_str::<MacAddress>("\"not-a-mac\"").is_err());
    }

    #[test]
    fn test_public_key_length_checked() {
        let key = TunnelPublicKey::from_bytes([7u8; KEY_SIZE]);
        assert_eq!(key.as_str().parse::<TunnelPublicKey>().unwrap(), key);

        let short = BASE64.encode([1u8; 16]);
        assert!(matches!(
            short.parse::<TunnelPublicKey>(),
            Err(CommonError::InvalidLength { expected: 32, actual: 16 })
        ));
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let key = TunnelPrivateKey::from_bytes([9u8; KEY_SIZE]);
        let debug = format!("{key:?}");
        assert!(!debug.contains(&key.to_base64()));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_private_key_serializes_as_base64() {
        let key = TunnelPrivateKey::from_bytes([3u8; KEY_SIZE]);
        let json = serde_json::to_string(&key).unwrap();
        let restored: TunnelPrivateKey = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, key);
    }

    #[test]
    fn test_uid_borrows_as_str() {
        let mut map = std::collections::HashMap::new();
        map.insert(AssetUid::from("ap-1"), 1);
        assert_eq!(map.get("ap-1"), Some(&1));
    }
}

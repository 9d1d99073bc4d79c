// ============================================
// File: crates/wisp-core/src/crypto/keys.rs
// ============================================
//! # Tunnel Key Derivation
//!
//! Curve25519 public key derivation, the same computation `wg pubkey`
//! performs.

use x25519_dalek::{PublicKey, StaticSecret};

use wisp_common::{TunnelPrivateKey, TunnelPublicKey};

/// Derives the public key for a tunnel private key.
///
/// # Example
/// ```
/// use wisp_common::TunnelPrivateKey;
/// use wisp_core::crypto::derive_public_key;
///
/// let private = TunnelPrivateKey::from_bytes([1u8; 32]);
/// let public = derive_public_key(&private);
/// assert_eq!(public.as_str().len(), 44);
/// ```
#[must_use]
pub fn derive_public_key(private: &TunnelPrivateKey) -> TunnelPublicKey {
    let secret = StaticSecret::from(*private.as_bytes());
    let public = PublicKey::from(&secret);
    TunnelPublicKey::from_bytes(public.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7748 section 6.1, Alice
    const ALICE_PRIVATE: &str = "dwdtCnMYpX08FsFyUbJmRd9ML4frwJkqsXf7pR25LCo=";
    const ALICE_PUBLIC: &str = "hSDwCYkwp1R0i33ctD73Wg2/Og0mOBr066SpjqqbTmo=";

    #[test]
    fn test_rfc7748_vector() {
        let private: TunnelPrivateKey = ALICE_PRIVATE.parse().unwrap();
        assert_eq!(derive_public_key(&private).as_str(), ALICE_PUBLIC);
    }

    #[test]
    fn test_distinct_keys() {
        let a = derive_public_key(&TunnelPrivateKey::from_bytes([1u8; 32]));
        let b = derive_public_key(&TunnelPrivateKey::from_bytes([2u8; 32]));
        assert_ne!(a, b);
    }
}

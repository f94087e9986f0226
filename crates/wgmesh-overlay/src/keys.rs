//! WireGuard key handling
//!
//! Keys are 32-byte Curve25519 values. On the wire (directory records,
//! `wg` output) they travel as standard base64, 44 characters long.

use crate::error::{OverlayError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of a raw WireGuard key in bytes
pub const KEY_LEN: usize = 32;

/// A WireGuard public or private key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WgKey([u8; KEY_LEN]);

impl WgKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Generate a fresh private key using native Rust crypto (x25519-dalek).
    ///
    /// No external `wg genkey` is required.
    pub fn generate_private() -> Self {
        use rand::rngs::OsRng;
        use x25519_dalek::StaticSecret;

        let secret = StaticSecret::random_from_rng(OsRng);
        Self(secret.to_bytes())
    }

    /// Derive the public key, treating `self` as a private key
    pub fn public_key(&self) -> Self {
        use x25519_dalek::{PublicKey, StaticSecret};

        let secret = StaticSecret::from(self.0);
        Self(*PublicKey::from(&secret).as_bytes())
    }

    /// Base64 encoding used by `wg` and the directory
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl FromStr for WgKey {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(s.trim())
            .map_err(|e| OverlayError::InvalidKey(format!("{s:?}: {e}")))?;
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            OverlayError::InvalidKey(format!(
                "Invalid key length: expected {KEY_LEN} bytes, got {}",
                b.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for WgKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

// Never print private key material by accident; Debug shows a short prefix only.
impl fmt::Debug for WgKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = self.to_base64();
        write!(f, "WgKey({}..)", &encoded[..8])
    }
}

impl Serialize for WgKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for WgKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_private_derives_matching_public() {
        let private = WgKey::generate_private();
        let public = private.public_key();

        use x25519_dalek::{PublicKey, StaticSecret};
        let expected = PublicKey::from(&StaticSecret::from(*private.as_bytes()));
        assert_eq!(public.as_bytes(), expected.as_bytes());
    }

    #[test]
    fn test_generate_keys_unique() {
        let key1 = WgKey::generate_private();
        let key2 = WgKey::generate_private();
        assert_ne!(
            key1, key2,
            "Sequential key generation should produce unique keys"
        );
    }

    #[test]
    fn test_base64_is_44_chars() {
        let key = WgKey::generate_private();
        let encoded = key.to_string();
        assert_eq!(encoded.len(), 44);
        assert_eq!(encoded.parse::<WgKey>().unwrap(), key);
    }

    #[test]
    fn test_parse_invalid_length() {
        let short = STANDARD.encode([0xABu8; 16]);
        let err = short.parse::<WgKey>().unwrap_err();
        assert!(err.to_string().contains("Invalid key length"));
    }

    #[test]
    fn test_parse_not_base64() {
        assert!("not-a-key!".parse::<WgKey>().is_err());
    }

    #[test]
    fn test_debug_does_not_leak_full_key() {
        let key = WgKey::from_bytes([0xABu8; 32]);
        let debug = format!("{key:?}");
        assert!(!debug.contains(&key.to_base64()));
    }
}

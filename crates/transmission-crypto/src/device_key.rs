//! # Device Key Material
//!
//! Devices sign tracking and telemetry payloads with an Ed25519 key bound to
//! a registry certificate. The service only ever holds the public half;
//! [`DeviceKeyPair`] exists for device simulators and tests.

use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CryptoError;

/// A device's Ed25519 public key. Serializes as lowercase hex.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DevicePublicKey([u8; 32]);

impl DevicePublicKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex key.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s.trim()).map_err(|e| CryptoError::Key(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::Key("public key must be 32 bytes".to_string()))?;
        Ok(Self(arr))
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Verify `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|e| CryptoError::Key(format!("invalid public key: {e}")))?;
        let sig = ed25519_dalek::Signature::from_slice(signature)
            .map_err(|_| CryptoError::VerificationFailed)?;
        key.verify(message, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl std::fmt::Debug for DevicePublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DevicePublicKey({}...)", &self.to_hex()[..16])
    }
}

impl Serialize for DevicePublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DevicePublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A device signing key. Not serializable.
pub struct DeviceKeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

impl DeviceKeyPair {
    /// Generate a fresh key from the OS RNG.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut rng),
        }
    }

    /// Rebuild a key pair from its 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(&seed),
        }
    }

    /// The public half.
    pub fn public_key(&self) -> DevicePublicKey {
        DevicePublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Raw 64-byte signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for DeviceKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceKeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let pair = DeviceKeyPair::generate();
        let sig = pair.sign(b"hello");
        assert!(pair.public_key().verify(b"hello", &sig).is_ok());
        assert_eq!(
            pair.public_key().verify(b"hellO", &sig),
            Err(CryptoError::VerificationFailed)
        );
    }

    #[test]
    fn seeded_keys_are_deterministic() {
        let a = DeviceKeyPair::from_seed([7u8; 32]);
        let b = DeviceKeyPair::from_seed([7u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn public_key_hex_serde() {
        let key = DeviceKeyPair::from_seed([1u8; 32]).public_key();
        let json = serde_json::to_string(&key).unwrap();
        let back: DevicePublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn truncated_signature_fails() {
        let pair = DeviceKeyPair::generate();
        let sig = pair.sign(b"x");
        assert!(pair.public_key().verify(b"x", &sig[..32]).is_err());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let pair = DeviceKeyPair::from_seed([9u8; 32]);
        let debug = format!("{pair:?}");
        assert!(!debug.contains(&hex::encode([9u8; 32])));
    }
}

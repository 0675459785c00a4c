//! # Asset Tag Hashing
//!
//! A shipment that requires GTX validation is tagged at pickup with the
//! physical id of the asset. Only the SHA-256 of that id is stored; at
//! drop-off the carrier re-presents the raw id and it is hashed and compared.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

/// One-way hash of a physical asset id.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AssetTagHash([u8; 32]);

impl AssetTagHash {
    /// Hash a raw asset id. The input is not retained.
    pub fn from_raw(raw: &str) -> Self {
        let digest = Sha256::digest(raw.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Whether `raw` hashes to this value. Constant time in the digest bytes.
    pub fn matches(&self, raw: &str) -> bool {
        let candidate = Self::from_raw(raw);
        self.0.ct_eq(&candidate.0).into()
    }

    /// Parse a stored hex digest.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s.trim()).map_err(|e| CryptoError::InvalidHash(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidHash(format!("expected 32 bytes: {s:?}")))?;
        Ok(Self(arr))
    }

    /// Lowercase hex digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for AssetTagHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AssetTagHash({}...)", &self.to_hex()[..8])
    }
}

impl std::fmt::Display for AssetTagHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for AssetTagHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AssetTagHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

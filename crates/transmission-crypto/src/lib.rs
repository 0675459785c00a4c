//! # transmission-crypto — Cryptographic Primitives
//!
//! - [`AssetTagHash`]: SHA-256 of a physical asset tag. The raw tag is never
//!   retained; comparison at drop-off is constant time.
//! - [`SignedPayload`]: compact Ed25519-signed payload posted by tracking
//!   devices, carrying the signing certificate id in its header.
//! - [`DevicePublicKey`] / [`DeviceKeyPair`]: device key material.
//!
//! ## Crate Policy
//!
//! - Private keys are never serialized or logged.
//! - No `unsafe` code.

pub mod asset_tag;
pub mod device_key;
pub mod envelope;
pub mod error;

pub use asset_tag::AssetTagHash;
pub use device_key::{DeviceKeyPair, DevicePublicKey};
pub use envelope::{PayloadHeader, SignedPayload, SIGNING_ALGORITHM};
pub use error::CryptoError;

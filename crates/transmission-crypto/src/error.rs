use thiserror::Error;

/// Errors raised while parsing or verifying device key material and payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The compact payload is not `header.payload.signature`.
    #[error("malformed signed payload: {0}")]
    Malformed(String),

    /// The header names an algorithm other than EdDSA.
    #[error("unsupported signing algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    /// Key bytes could not be parsed.
    #[error("key error: {0}")]
    Key(String),

    /// Signature did not verify against the device key.
    #[error("signature verification failed")]
    VerificationFailed,

    /// The stored hash is not a 64-character hex digest.
    #[error("invalid asset tag hash: {0}")]
    InvalidHash(String),
}

//! # Device-Signed Payloads
//!
//! Devices post tracking and telemetry readings as compact signed payloads:
//!
//! ```text
//! base64url(header) "." base64url(payload) "." base64url(signature)
//! ```
//!
//! The header is `{"alg":"EdDSA","kid":"<certificate id>"}`. The signature
//! covers the ASCII bytes of `base64url(header) "." base64url(payload)`.
//! Verification needs the public key of the certificate named in `kid`, so
//! parsing and verifying are separate steps.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use transmission_core::CertificateId;

use crate::device_key::{DeviceKeyPair, DevicePublicKey};
use crate::error::CryptoError;

/// The only accepted `alg` header value.
pub const SIGNING_ALGORITHM: &str = "EdDSA";

/// Protected header of a signed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadHeader {
    /// Signing algorithm.
    pub alg: String,
    /// Certificate id of the signing device.
    pub kid: CertificateId,
}

/// A parsed but not yet verified signed payload.
#[derive(Debug, Clone)]
pub struct SignedPayload {
    header: PayloadHeader,
    signing_input: String,
    payload: Vec<u8>,
    signature: Vec<u8>,
}

impl SignedPayload {
    /// Split and decode a compact payload. Does not verify the signature.
    pub fn parse(compact: &str) -> Result<Self, CryptoError> {
        let mut parts = compact.trim().split('.');
        let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CryptoError::Malformed(
                "expected three dot-separated segments".to_string(),
            ));
        };

        let header_bytes = decode_segment("header", header_b64)?;
        let header: PayloadHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| CryptoError::Malformed(format!("header: {e}")))?;
        if header.alg != SIGNING_ALGORITHM {
            return Err(CryptoError::UnsupportedAlgorithm(header.alg));
        }

        Ok(Self {
            signing_input: format!("{header_b64}.{payload_b64}"),
            payload: decode_segment("payload", payload_b64)?,
            signature: decode_segment("signature", sig_b64)?,
            header,
        })
    }

    /// Certificate the device claims to have signed with.
    pub fn certificate_id(&self) -> &CertificateId {
        &self.header.kid
    }

    /// Verify against `key` and return the decoded JSON body.
    pub fn verify(&self, key: &DevicePublicKey) -> Result<serde_json::Value, CryptoError> {
        key.verify(self.signing_input.as_bytes(), &self.signature)?;
        serde_json::from_slice(&self.payload)
            .map_err(|e| CryptoError::Malformed(format!("payload: {e}")))
    }

    /// Produce a compact payload signed by `key`.
    pub fn sign(
        body: &serde_json::Value,
        certificate_id: &CertificateId,
        key: &DeviceKeyPair,
    ) -> Result<String, CryptoError> {
        let header = PayloadHeader {
            alg: SIGNING_ALGORITHM.to_string(),
            kid: certificate_id.clone(),
        };
        let header_json =
            serde_json::to_vec(&header).map_err(|e| CryptoError::Malformed(e.to_string()))?;
        let body_json =
            serde_json::to_vec(body).map_err(|e| CryptoError::Malformed(e.to_string()))?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(body_json)
        );
        let signature = key.sign(signing_input.as_bytes());
        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }
}

fn decode_segment(name: &str, segment: &str) -> Result<Vec<u8>, CryptoError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| CryptoError::Malformed(format!("{name}: {e}")))
}

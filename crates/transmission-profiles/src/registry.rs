//! # Device Certificate Registry Client
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET | `/certificates/{certificate_id}` | one certificate, 404 when unknown |
//! | GET | `/devices/{device_id}/certificates` | all certificates of a device |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use transmission_core::{CertificateId, DeviceId};
use url::Url;

use crate::config::endpoint_url;
use crate::error::ProfilesError;
use crate::gateway::DeviceRegistry;

/// Registry status of a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    Active,
    Inactive,
    /// Forward-compatible catch-all.
    #[serde(other)]
    Unknown,
}

/// A device certificate as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub certificate_id: CertificateId,
    pub status: CertificateStatus,
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    /// Hex-encoded Ed25519 public key.
    pub public_key: String,
}

impl CertificateRecord {
    pub fn is_active(&self) -> bool {
        self.status == CertificateStatus::Active
    }
}

/// Client for the device certificate registry.
#[derive(Debug, Clone)]
pub struct DeviceRegistryClient {
    http: reqwest::Client,
    base_url: Url,
}

impl DeviceRegistryClient {
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: String,
        path: &str,
    ) -> Result<Option<T>, ProfilesError> {
        let url = endpoint_url(&self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ProfilesError::Http {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProfilesError::ApiError {
                endpoint,
                status,
                body,
            });
        }

        resp.json()
            .await
            .map(Some)
            .map_err(|e| ProfilesError::Deserialization {
                endpoint,
                source: e,
            })
    }
}

#[async_trait]
impl DeviceRegistry for DeviceRegistryClient {
    async fn certificate(
        &self,
        certificate: &CertificateId,
    ) -> Result<Option<CertificateRecord>, ProfilesError> {
        self.get_json(
            "GET /certificates/{id}".to_string(),
            &format!("certificates/{certificate}"),
        )
        .await
    }

    async fn active_certificate_for_device(
        &self,
        device: &DeviceId,
    ) -> Result<Option<CertificateRecord>, ProfilesError> {
        let all: Option<Vec<CertificateRecord>> = self
            .get_json(
                "GET /devices/{id}/certificates".to_string(),
                &format!("devices/{device}/certificates"),
            )
            .await?;
        Ok(all
            .unwrap_or_default()
            .into_iter()
            .find(CertificateRecord::is_active))
    }
}

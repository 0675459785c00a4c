//! # Profiles Identity Client
//!
//! | Method | Path | Meaning of 200 |
//! |--------|------|----------------|
//! | GET | `/api/v1/wallet/{id}/?is_active` | caller holds the wallet |
//! | GET | `/api/v1/storage_credentials/{id}/?is_active` | caller holds the credentials |
//! | GET | `/api/v1/device/{id}/?is_active` | caller owns the device |
//!
//! Any 4xx answer is a denial. 5xx answers and transport failures are errors.

use async_trait::async_trait;
use transmission_core::{DeviceId, StorageCredentialsId, WalletId};
use url::Url;

use crate::config::endpoint_url;
use crate::error::ProfilesError;
use crate::gateway::IdentityGateway;

/// Client for the Profiles identity service.
#[derive(Debug, Clone)]
pub struct ProfilesClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ProfilesClient {
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    async fn is_active(&self, token: &str, resource: &str, id: &str) -> Result<bool, ProfilesError> {
        let endpoint = format!("GET /api/v1/{resource}/{{id}}/?is_active");
        let url = endpoint_url(&self.base_url, &format!("api/v1/{resource}/{id}/?is_active"));

        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProfilesError::Http {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(true);
        }
        if status.is_client_error() {
            tracing::debug!(resource, id, status = status.as_u16(), "profiles denied lookup");
            return Ok(false);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ProfilesError::ApiError {
            endpoint,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl IdentityGateway for ProfilesClient {
    async fn wallet_is_active(&self, token: &str, wallet: &WalletId) -> Result<bool, ProfilesError> {
        self.is_active(token, "wallet", wallet.as_str()).await
    }

    async fn storage_credentials_is_active(
        &self,
        token: &str,
        credentials: &StorageCredentialsId,
    ) -> Result<bool, ProfilesError> {
        self.is_active(token, "storage_credentials", credentials.as_str())
            .await
    }

    async fn device_is_active(&self, token: &str, device: &DeviceId) -> Result<bool, ProfilesError> {
        self.is_active(token, "device", &device.to_string()).await
    }
}

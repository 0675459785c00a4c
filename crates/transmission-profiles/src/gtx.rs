//! GTX validation client: `POST /validations`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use transmission_core::ShipmentId;
use url::Url;

use crate::config::endpoint_url;
use crate::error::ProfilesError;
use crate::gateway::GtxValidator;

/// Validation result reported by the GTX engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GtxOutcome {
    /// Accepted for asynchronous validation.
    Pending,
    Valid,
    Invalid,
}

#[derive(Serialize)]
struct ValidationRequest<'a> {
    shipment_id: &'a ShipmentId,
    asset_physical_id: &'a str,
}

#[derive(Deserialize)]
struct ValidationResponse {
    status: GtxOutcome,
}

/// Client for the GTX validation engine.
#[derive(Debug, Clone)]
pub struct GtxClient {
    http: reqwest::Client,
    base_url: Url,
}

impl GtxClient {
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl GtxValidator for GtxClient {
    async fn request_validation(
        &self,
        shipment: &ShipmentId,
        asset_hash: &str,
    ) -> Result<GtxOutcome, ProfilesError> {
        let endpoint = "POST /validations".to_string();
        let url = endpoint_url(&self.base_url, "validations");

        let resp = self
            .http
            .post(&url)
            .json(&ValidationRequest {
                shipment_id: shipment,
                asset_physical_id: asset_hash,
            })
            .send()
            .await
            .map_err(|e| ProfilesError::Http {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProfilesError::ApiError {
                endpoint,
                status,
                body,
            });
        }

        resp.json::<ValidationResponse>()
            .await
            .map(|r| r.status)
            .map_err(|e| ProfilesError::Deserialization {
                endpoint,
                source: e,
            })
    }
}

//! Device shadow client: `POST /things/{device_id}/shadow`.

use async_trait::async_trait;
use serde::Serialize;
use transmission_core::{DeviceId, ShipmentId};
use url::Url;

use crate::config::endpoint_url;
use crate::error::ProfilesError;
use crate::gateway::ShadowPublisher;

/// Desired device state after a shipment changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowUpdate {
    /// Shipment the device now reports for. `None` detaches it.
    pub shipment_id: Option<ShipmentId>,
    /// Lifecycle state wire form.
    pub shipment_state: Option<String>,
}

#[derive(Serialize)]
struct ShadowDocument<'a> {
    state: DesiredState<'a>,
}

#[derive(Serialize)]
struct DesiredState<'a> {
    desired: &'a ShadowUpdate,
}

/// Client for the device shadow service.
#[derive(Debug, Clone)]
pub struct ShadowClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ShadowClient {
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl ShadowPublisher for ShadowClient {
    async fn publish(&self, device: &DeviceId, update: &ShadowUpdate) -> Result<(), ProfilesError> {
        let endpoint = "POST /things/{id}/shadow".to_string();
        let url = endpoint_url(&self.base_url, &format!("things/{device}/shadow"));
        let body = ShadowDocument {
            state: DesiredState { desired: update },
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
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
        Ok(())
    }
}

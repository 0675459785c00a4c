//! # Device Assignment and Ingestion
//!
//! A device is attached to at most one shipment that is not DELIVERED. A
//! device on a DELIVERED shipment may be claimed by a new shipment, which
//! clears it from the old one. The device of a shipment between pickup and
//! delivery cannot be replaced or detached.
//!
//! Devices post signed payloads. The certificate named in the payload must
//! be the device's stored certificate; otherwise the registry is asked and
//! an ACTIVE certificate bound to the same device replaces the stored one.
//!
//! ## Lock order
//!
//! The device store is locked before the shipment store, never the reverse.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use transmission_core::{CertificateId, DeviceId, ShipmentId};
use transmission_crypto::{CryptoError, DevicePublicKey, SignedPayload};
use transmission_profiles::{CertificateRecord, ShadowUpdate};
use transmission_state::ShipmentState;

use crate::auth::RequestContext;
use crate::error::AppError;
use crate::extractors::{require_text, Validate};
use crate::records::{check_coordinates, DeviceRecord, ShipmentRecord, MAX_FIELD_LEN};
use crate::state::AppState;

/// Devices whose assignment changed, for shadow updates after commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceChange {
    pub attached: Option<DeviceId>,
    pub detached: Option<DeviceId>,
    /// Delivered shipment the attached device was taken from.
    pub moved_from: Option<ShipmentId>,
}

impl DeviceChange {
    pub fn is_empty(&self) -> bool {
        self.attached.is_none() && self.detached.is_none()
    }
}

fn parse_key(certificate: &CertificateRecord) -> Result<DevicePublicKey, AppError> {
    DevicePublicKey::from_hex(&certificate.public_key).map_err(|e| {
        AppError::Upstream(format!(
            "registry returned an unusable key for certificate {}: {e}",
            certificate.certificate_id
        ))
    })
}

/// Point `shipment.device_id` at `requested`, updating the device records.
///
/// `shipment` is the caller's working copy; it is not written to the store
/// here. Device records are persisted.
pub async fn assign(
    state: &AppState,
    ctx: &RequestContext,
    shipment: &mut ShipmentRecord,
    requested: Option<DeviceId>,
) -> Result<DeviceChange, AppError> {
    let current = shipment.device_id;
    if current == requested {
        return Ok(DeviceChange::default());
    }
    if shipment.lifecycle.state().is_in_progress() {
        return Err(AppError::field(
            "device_id",
            format!(
                "Cannot change the device of a Shipment in state {}",
                shipment.lifecycle.state()
            ),
        ));
    }

    let mut change = DeviceChange::default();
    if let Some(device_id) = requested {
        change.moved_from = claim(state, ctx, shipment.id, device_id).await?;
        change.attached = Some(device_id);
    }
    if let Some(old) = current {
        release(state, old, shipment.id).await?;
        change.detached = Some(old);
    }
    shipment.device_id = requested;
    Ok(change)
}

/// Returns the delivered shipment the device was moved off, if any.
async fn claim(
    state: &AppState,
    ctx: &RequestContext,
    shipment_id: ShipmentId,
    device_id: DeviceId,
) -> Result<Option<ShipmentId>, AppError> {
    let identity = state.identity()?;
    let token = ctx
        .token
        .as_deref()
        .ok_or_else(|| AppError::field("device_id", "A bearer token is required to assign a device"))?;
    if !identity.device_is_active(token, &device_id).await? {
        return Err(AppError::field(
            "device_id",
            format!("User does not have access to this device ({device_id})"),
        ));
    }

    let certificate = match &state.registry {
        Some(registry) => registry.active_certificate_for_device(&device_id).await?,
        None => None,
    };
    let key = certificate.as_ref().map(parse_key).transpose()?;

    let now = Utc::now();
    state.devices.get_or_insert_with(device_id, || DeviceRecord {
        id: device_id,
        certificate_id: None,
        public_key: None,
        shipment_id: None,
        created_at: now,
        updated_at: now,
    });

    let previous = state
        .devices
        .try_update(&device_id, |device| {
            let previous = device.shipment_id.filter(|other| *other != shipment_id);
            if let Some(other) = previous {
                let delivered = state
                    .shipments
                    .get(&other)
                    .map_or(true, |s| s.lifecycle.state() == ShipmentState::Delivered);
                if !delivered {
                    return Err(AppError::Conflict(
                        "Device is already assigned to a Shipment in progress".to_string(),
                    ));
                }
            }
            device.shipment_id = Some(shipment_id);
            if let (Some(certificate), Some(key)) = (&certificate, key.clone()) {
                device.certificate_id = Some(certificate.certificate_id.clone());
                device.public_key = Some(key);
            }
            device.updated_at = now;
            Ok((previous, device.clone()))
        })
        .ok_or_else(|| AppError::Internal(format!("device {device_id} vanished during claim")))?;
    let (previous, device) = previous?;
    state.persist(&device).await?;
    tracing::info!(%device_id, %shipment_id, "device assigned");

    if let Some(other) = previous {
        let updated = state.shipments.update(&other, |s| {
            if s.device_id == Some(device_id) {
                s.device_id = None;
                s.updated_at = now;
            }
        });
        if let Some(updated) = updated {
            state.persist(&updated).await?;
            tracing::info!(%device_id, shipment_id = %other, "device moved off delivered shipment");
        }
    }
    Ok(previous)
}

async fn release(state: &AppState, device_id: DeviceId, shipment_id: ShipmentId) -> Result<(), AppError> {
    let released = state.devices.update(&device_id, |device| {
        if device.shipment_id == Some(shipment_id) {
            device.shipment_id = None;
            device.updated_at = Utc::now();
        }
    });
    if let Some(device) = released {
        state.persist(&device).await?;
        tracing::info!(%device_id, %shipment_id, "device released");
    }
    Ok(())
}

/// Undo an [`assign`] whose shipment write did not commit. Failures are
/// logged; the caller is already returning an error.
pub async fn revert(state: &AppState, shipment_id: ShipmentId, change: DeviceChange) {
    if change.is_empty() {
        return;
    }
    if let Err(e) = try_revert(state, shipment_id, change).await {
        tracing::error!(%shipment_id, error = %e, "failed to revert device assignment");
    }
}

async fn try_revert(state: &AppState, shipment_id: ShipmentId, change: DeviceChange) -> Result<(), AppError> {
    let now = Utc::now();
    if let Some(device_id) = change.attached {
        let restored = state.devices.update(&device_id, |device| {
            if device.shipment_id == Some(shipment_id) {
                device.shipment_id = change.moved_from;
                device.updated_at = now;
            }
        });
        if let Some(device) = restored {
            state.persist(&device).await?;
        }
        if let Some(other) = change.moved_from {
            let restored = state.shipments.update(&other, |s| {
                if s.device_id.is_none() {
                    s.device_id = Some(device_id);
                    s.updated_at = now;
                }
            });
            if let Some(shipment) = restored {
                state.persist(&shipment).await?;
            }
        }
        tracing::info!(%device_id, %shipment_id, "device claim reverted");
    }
    if let Some(device_id) = change.detached {
        let restored = state.devices.update(&device_id, |device| {
            if device.shipment_id.is_none() {
                device.shipment_id = Some(shipment_id);
                device.updated_at = now;
            }
        });
        if let Some(device) = restored {
            state.persist(&device).await?;
            tracing::info!(%device_id, %shipment_id, "device release reverted");
        }
    }
    Ok(())
}

/// Push the desired state to each changed device. Failures are logged only.
pub async fn publish_change(state: &AppState, shipment: &ShipmentRecord, change: DeviceChange) {
    if let Some(device) = change.detached {
        publish(state, device, None).await;
    }
    if let Some(device) = change.attached {
        publish(state, device, Some(shipment)).await;
    }
}

/// Push the shipment's current state to its device, if it has one.
pub async fn publish_state(state: &AppState, shipment: &ShipmentRecord) {
    if let Some(device) = shipment.device_id {
        publish(state, device, Some(shipment)).await;
    }
}

async fn publish(state: &AppState, device: DeviceId, shipment: Option<&ShipmentRecord>) {
    let Some(shadow) = &state.shadow else {
        tracing::debug!(device_id = %device, "device shadow not configured; skipping update");
        return;
    };
    let update = ShadowUpdate {
        shipment_id: shipment.map(|s| s.id),
        shipment_state: shipment.map(|s| s.lifecycle.state().as_str().to_string()),
    };
    if let Err(e) = shadow.publish(&device, &update).await {
        tracing::warn!(device_id = %device, error = %e, "device shadow update failed");
    }
}

// ─── Ingestion ───────────────────────────────────────────────────────

/// One tracking point as signed by the device.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingPayload {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub uncertainty: Option<f64>,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl Validate for TrackingPayload {
    fn validate(&self) -> Result<(), AppError> {
        check_coordinates("", Some(self.latitude), Some(self.longitude))?;
        require_text("source", &self.source, MAX_FIELD_LEN)?;
        require_text("version", &self.version, MAX_FIELD_LEN)
    }
}

/// One sensor reading as signed by the device.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryPayload {
    pub hardware_id: String,
    pub sensor_id: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl Validate for TelemetryPayload {
    fn validate(&self) -> Result<(), AppError> {
        require_text("hardware_id", &self.hardware_id, MAX_FIELD_LEN)?;
        require_text("sensor_id", &self.sensor_id, MAX_FIELD_LEN)?;
        if !self.value.is_finite() {
            return Err(AppError::field("value", "value must be a finite number"));
        }
        require_text("version", &self.version, MAX_FIELD_LEN)
    }
}

/// Parse, authenticate and decode every payload of one request. Nothing is
/// written unless all of them pass, except a certificate rotation confirmed
/// by the registry.
pub async fn verify_payloads<T>(
    state: &AppState,
    device_id: DeviceId,
    compact: &[String],
) -> Result<(ShipmentRecord, Vec<T>), AppError>
where
    T: serde::de::DeserializeOwned + Validate,
{
    let mut device = state
        .devices
        .get(&device_id)
        .ok_or_else(|| AppError::not_found("Device"))?;

    let mut decoded = Vec::with_capacity(compact.len());
    for raw in compact {
        let payload = SignedPayload::parse(raw).map_err(|e| AppError::field("payload", e.to_string()))?;
        let key = signing_key(state, &mut device, payload.certificate_id()).await?;
        let body = payload.verify(&key).map_err(|e| match e {
            CryptoError::Malformed(_) => AppError::field("payload", e.to_string()),
            _ => {
                tracing::warn!(%device_id, "device payload failed signature verification");
                AppError::Forbidden("Signature verification failed".to_string())
            }
        })?;
        let value: T = serde_json::from_value(body).map_err(|e| AppError::field("payload", e.to_string()))?;
        value.validate()?;
        decoded.push(value);
    }

    let shipment_id = device
        .shipment_id
        .ok_or_else(|| AppError::invalid("No shipment found associated to device"))?;
    let shipment = state
        .shipments
        .get(&shipment_id)
        .ok_or_else(|| AppError::invalid("No shipment found associated to device"))?;
    if !shipment.lifecycle.state().is_in_progress() {
        return Err(AppError::invalid(format!(
            "Shipment is in state {}; device data is only accepted in transit",
            shipment.lifecycle.state()
        )));
    }
    Ok((shipment, decoded))
}

/// Key for `certificate_id`, rotating the device's certificate when the
/// registry confirms the new one.
async fn signing_key(
    state: &AppState,
    device: &mut DeviceRecord,
    certificate_id: &CertificateId,
) -> Result<DevicePublicKey, AppError> {
    if device.certificate_id.as_ref() == Some(certificate_id) {
        if let Some(key) = &device.public_key {
            return Ok(key.clone());
        }
    }

    let registry = state.registry()?;
    let certificate = registry
        .certificate(certificate_id)
        .await?
        .filter(|c| c.is_active() && c.device_id == Some(device.id))
        .ok_or_else(|| {
            tracing::warn!(device_id = %device.id, %certificate_id, "certificate not active for device");
            AppError::Forbidden(format!(
                "Certificate {certificate_id} is not active for this device"
            ))
        })?;
    let key = parse_key(&certificate)?;

    let now = Utc::now();
    let rotated = state.devices.update(&device.id, |d| {
        d.certificate_id = Some(certificate.certificate_id.clone());
        d.public_key = Some(key.clone());
        d.updated_at = now;
    });
    if let Some(rotated) = rotated {
        state.persist(&rotated).await?;
        tracing::info!(device_id = %device.id, %certificate_id, "device certificate rotated");
        *device = rotated;
    }
    Ok(key)
}

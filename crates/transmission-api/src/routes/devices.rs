//! # Device Data
//!
//! Devices post signed tracking points and sensor readings without a user
//! token; the signature authenticates them (see [`crate::devices`]). Reads go
//! through the shipment's tracking and telemetry permissions.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use transmission_core::{DeviceId, Endpoint, PermissionLevel, ShipmentId, TelemetryId, TrackingId};
use utoipa::{IntoParams, ToSchema};

use crate::access::{self, shipment_or_404};
use crate::auth::RequestContext;
use crate::devices::{verify_payloads, TelemetryPayload, TrackingPayload};
use crate::error::AppError;
use crate::jsonapi::{extract_body, JsonApi, Resource};
use crate::records::{TelemetryRecord, TrackingRecord};
use crate::routes::method_not_allowed;
use crate::state::AppState;

pub const TELEMETRY_RESOURCE: &str = "Telemetry";

const GEOJSON_MEDIA_TYPE: &str = "application/geo+json";

/// One signed payload.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SignedPayloadBody {
    /// Compact signed payload: `base64url(header).base64url(body).base64url(signature)`.
    pub payload: String,
}

/// A single payload or a batch.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum IngestBody {
    One(SignedPayloadBody),
    Many(Vec<SignedPayloadBody>),
}

impl IngestBody {
    fn into_payloads(self) -> Vec<String> {
        match self {
            Self::One(one) => vec![one.payload],
            Self::Many(many) => many.into_iter().map(|p| p.payload).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TelemetryQuery {
    pub sensor_id: Option<String>,
    pub hardware_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TelemetryAttributes {
    pub device_id: DeviceId,
    pub hardware_id: String,
    pub sensor_id: String,
    pub value: f64,
    pub timestamp: chrono::DateTime<Utc>,
    pub version: String,
}

impl From<&TelemetryRecord> for TelemetryAttributes {
    fn from(record: &TelemetryRecord) -> Self {
        Self {
            device_id: record.device_id,
            hardware_id: record.hardware_id.clone(),
            sensor_id: record.sensor_id.clone(),
            value: record.value,
            timestamp: record.timestamp,
            version: record.version.clone(),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/devices/{device_id}/tracking",
            post(ingest_tracking).fallback(method_not_allowed),
        )
        .route(
            "/devices/{device_id}/telemetry",
            post(ingest_telemetry).fallback(method_not_allowed),
        )
        .route(
            "/shipments/{id}/tracking",
            get(get_tracking).fallback(method_not_allowed),
        )
        .route(
            "/shipments/{id}/telemetry",
            get(get_telemetry).fallback(method_not_allowed),
        )
}

fn payloads(body: Result<Json<Value>, JsonRejection>) -> Result<Vec<String>, AppError> {
    let payloads = extract_body::<IngestBody>(body)?.into_payloads();
    if payloads.is_empty() {
        return Err(AppError::field("payload", "At least one payload is required"));
    }
    Ok(payloads)
}

/// POST /devices/{device_id}/tracking — Signed tracking points.
#[utoipa::path(
    post,
    path = "/devices/{device_id}/tracking",
    params(("device_id" = Uuid, Path, description = "Device ID")),
    request_body = IngestBody,
    responses(
        (status = 204, description = "Points recorded"),
        (status = 400, description = "Malformed payload or shipment not in transit", body = crate::error::ErrorBody),
        (status = 403, description = "Signature or certificate rejected", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown device", body = crate::error::ErrorBody),
    ),
    tag = "devices"
)]
async fn ingest_tracking(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let raw = payloads(body)?;
    let (shipment, points) = verify_payloads::<TrackingPayload>(&state, device_id, &raw).await?;

    let now = Utc::now();
    for point in points {
        let record = TrackingRecord {
            id: TrackingId::new(),
            shipment_id: shipment.id,
            device_id,
            latitude: point.latitude,
            longitude: point.longitude,
            altitude: point.altitude,
            speed: point.speed,
            uncertainty: point.uncertainty,
            source: point.source,
            timestamp: point.timestamp,
            version: point.version,
            created_at: now,
        };
        state.tracking.insert(record.id, record.clone());
        state.persist(&record).await?;
    }
    tracing::info!(%device_id, shipment_id = %shipment.id, count = raw.len(), "tracking data recorded");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /devices/{device_id}/telemetry — Signed sensor readings.
#[utoipa::path(
    post,
    path = "/devices/{device_id}/telemetry",
    params(("device_id" = Uuid, Path, description = "Device ID")),
    request_body = IngestBody,
    responses(
        (status = 204, description = "Readings recorded"),
        (status = 400, description = "Malformed payload or shipment not in transit", body = crate::error::ErrorBody),
        (status = 403, description = "Signature or certificate rejected", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown device", body = crate::error::ErrorBody),
    ),
    tag = "devices"
)]
async fn ingest_telemetry(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let raw = payloads(body)?;
    let (shipment, readings) = verify_payloads::<TelemetryPayload>(&state, device_id, &raw).await?;

    let now = Utc::now();
    for reading in readings {
        let record = TelemetryRecord {
            id: TelemetryId::new(),
            shipment_id: shipment.id,
            device_id,
            hardware_id: reading.hardware_id,
            sensor_id: reading.sensor_id,
            value: reading.value,
            timestamp: reading.timestamp,
            version: reading.version,
            created_at: now,
        };
        state.telemetry.insert(record.id, record.clone());
        state.persist(&record).await?;
    }
    tracing::info!(%device_id, shipment_id = %shipment.id, count = raw.len(), "telemetry recorded");
    Ok(StatusCode::NO_CONTENT)
}

/// Tracking points as a GeoJSON FeatureCollection of Points.
fn feature_collection(points: &[TrackingRecord]) -> Value {
    let features: Vec<Value> = points
        .iter()
        .map(|p| {
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [p.longitude, p.latitude],
                },
                "properties": {
                    "time": p.timestamp,
                    "source": p.source,
                    "uncertainty": p.uncertainty,
                    "altitude": p.altitude,
                    "speed": p.speed,
                },
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}

/// GET /shipments/{id}/tracking — Route as GeoJSON.
#[utoipa::path(
    get,
    path = "/shipments/{id}/tracking",
    params(
        ("id" = Uuid, Path, description = "Shipment ID"),
        ("permission_link" = Option<Uuid>, Query, description = "Permission link granting anonymous read access"),
    ),
    responses(
        (status = 200, description = "GeoJSON FeatureCollection (application/geo+json) ordered by timestamp"),
        (status = 403, description = "Permission denied", body = crate::error::ErrorBody),
        (status = 404, description = "Shipment not found", body = crate::error::ErrorBody),
    ),
    tag = "devices"
)]
async fn get_tracking(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<ShipmentId>,
) -> Result<Response, AppError> {
    let shipment = shipment_or_404(&state, &id)?;
    access::require(&state, &ctx, &shipment, Endpoint::Tracking, PermissionLevel::ReadOnly).await?;

    let mut points = state.tracking.filter(|p| p.shipment_id == id);
    points.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    let body = serde_json::to_vec(&feature_collection(&points))
        .map_err(|e| AppError::Internal(format!("serialize tracking: {e}")))?;
    Ok(([(header::CONTENT_TYPE, GEOJSON_MEDIA_TYPE)], body).into_response())
}

/// GET /shipments/{id}/telemetry — Sensor readings.
#[utoipa::path(
    get,
    path = "/shipments/{id}/telemetry",
    params(("id" = Uuid, Path, description = "Shipment ID"), TelemetryQuery),
    responses(
        (status = 200, description = "Readings ordered by timestamp", body = [TelemetryAttributes]),
        (status = 403, description = "Permission denied", body = crate::error::ErrorBody),
        (status = 404, description = "Shipment not found", body = crate::error::ErrorBody),
    ),
    tag = "devices"
)]
async fn get_telemetry(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<ShipmentId>,
    Query(query): Query<TelemetryQuery>,
) -> Result<JsonApi, AppError> {
    let shipment = shipment_or_404(&state, &id)?;
    access::require(&state, &ctx, &shipment, Endpoint::Telemetry, PermissionLevel::ReadOnly).await?;

    let mut readings = state.telemetry.filter(|r| {
        r.shipment_id == id
            && query.sensor_id.as_deref().map_or(true, |s| r.sensor_id == s)
            && query.hardware_id.as_deref().map_or(true, |h| r.hardware_id == h)
    });
    readings.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    let resources = readings
        .iter()
        .map(|r| Resource::new(TELEMETRY_RESOURCE, r.id, &TelemetryAttributes::from(r)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(JsonApi::many(resources))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_accepts_one_or_many() {
        let one: IngestBody = serde_json::from_value(json!({"payload": "a.b.c"})).unwrap();
        assert_eq!(one.into_payloads(), vec!["a.b.c"]);
        let many: IngestBody =
            serde_json::from_value(json!([{"payload": "a"}, {"payload": "b"}])).unwrap();
        assert_eq!(many.into_payloads(), vec!["a", "b"]);
    }

    #[test]
    fn empty_batch_is_rejected() {
        let err = payloads(Ok(Json(json!([])))).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn geojson_uses_lon_lat_order() {
        let point = TrackingRecord {
            id: TrackingId::new(),
            shipment_id: ShipmentId::new(),
            device_id: DeviceId::new(),
            latitude: 51.9,
            longitude: 4.4,
            altitude: None,
            speed: Some(12.0),
            uncertainty: None,
            source: "GPS".into(),
            timestamp: Utc::now(),
            version: "1.0".into(),
            created_at: Utc::now(),
        };
        let fc = feature_collection(&[point]);
        assert_eq!(fc["type"], "FeatureCollection");
        let coords = &fc["features"][0]["geometry"]["coordinates"];
        assert_eq!(coords[0], 4.4);
        assert_eq!(coords[1], 51.9);
        assert_eq!(fc["features"][0]["properties"]["source"], "GPS");
    }
}

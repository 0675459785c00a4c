//! # Shipment API
//!
//! Shipment CRUD, lifecycle actions and the audit history.
//!
//! | Method | Path | Access |
//! |--------|------|--------|
//! | GET | `/shipments` | authenticated; visible shipments only |
//! | POST | `/shipments` | authenticated; wallet and credentials checked |
//! | GET | `/shipments/{id}` | shipment READ_ONLY |
//! | PATCH | `/shipments/{id}` | shipment READ_WRITE |
//! | POST | `/shipments/{id}/actions` | shipment READ_WRITE |
//! | GET | `/shipments/{id}/history` | shipment READ_ONLY |
//!
//! `state` and `asset_physical_id` are never written through PATCH; they
//! change only through actions.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use transmission_access::{authorize, GrantFacts};
use transmission_core::{
    DeviceId, Endpoint, OrganizationId, PermissionLevel, ShipmentId, StorageCredentialsId, UserId,
    WalletId,
};
use transmission_profiles::GtxOutcome;
use transmission_state::{
    ActionInput, ExceptionType, GtxValidation, ShipmentAction, ShipmentError, ShipmentLifecycle,
    ShipmentState, TransitionEffect,
};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::access::{self, shipment_or_404};
use crate::auth::RequestContext;
use crate::devices;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::history::{HistoryEntry, RecordType};
use crate::jsonapi::{extract_attributes, extract_body, JsonApi, Resource};
use crate::records::{Location, ShipmentDetails, ShipmentRecord, TagRecord};
use crate::routes::{attr, method_not_allowed};
use crate::state::AppState;

pub const RESOURCE: &str = "Shipment";

/// Attributes that PATCH silently ignores.
const READ_ONLY_FIELDS: &[&str] = &[
    "owner_id",
    "organization_id",
    "shipper_wallet_id",
    "storage_credentials_id",
    "vault_id",
    "gtx_validation",
    "pickup_act",
    "port_arrival_act",
    "delivery_act",
    "created_at",
    "updated_at",
];

// ─── Representation ──────────────────────────────────────────────────

/// Shipment attributes as returned to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ShipmentAttributes {
    pub owner_id: UserId,
    pub organization_id: Option<OrganizationId>,
    pub shipper_wallet_id: WalletId,
    pub carrier_wallet_id: WalletId,
    pub moderator_wallet_id: Option<WalletId>,
    pub storage_credentials_id: StorageCredentialsId,
    pub vault_id: Uuid,
    pub device_id: Option<DeviceId>,
    pub state: ShipmentState,
    pub exception: ExceptionType,
    pub gtx_required: bool,
    pub gtx_validation: GtxValidation,
    /// Hex SHA-256 of the asset tag recorded at pickup.
    pub asset_physical_id: Option<String>,
    pub pickup_act: Option<DateTime<Utc>>,
    pub port_arrival_act: Option<DateTime<Utc>>,
    pub delivery_act: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub details: ShipmentDetails,
    pub ship_from_location: Option<Location>,
    pub ship_to_location: Option<Location>,
    /// Present only when the caller may read tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<TagRecord>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShipmentAttributes {
    pub fn from_record(record: &ShipmentRecord, tags: Option<Vec<TagRecord>>) -> Self {
        let lifecycle = &record.lifecycle;
        Self {
            owner_id: record.owner_id.clone(),
            organization_id: record.organization_id.clone(),
            shipper_wallet_id: record.shipper_wallet_id.clone(),
            carrier_wallet_id: record.carrier_wallet_id.clone(),
            moderator_wallet_id: record.moderator_wallet_id.clone(),
            storage_credentials_id: record.storage_credentials_id.clone(),
            vault_id: record.vault_id,
            device_id: record.device_id,
            state: lifecycle.state(),
            exception: record.exception,
            gtx_required: lifecycle.gtx_required(),
            gtx_validation: lifecycle.gtx_validation(),
            asset_physical_id: lifecycle.asset_physical_id().map(|h| h.to_hex()),
            pickup_act: lifecycle.pickup_act(),
            port_arrival_act: lifecycle.port_arrival_act(),
            delivery_act: lifecycle.delivery_act(),
            details: record.details.clone(),
            ship_from_location: record.ship_from_location.clone(),
            ship_to_location: record.ship_to_location.clone(),
            tags,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// History snapshot of a shipment.
pub fn snapshot(record: &ShipmentRecord) -> Value {
    serde_json::to_value(ShipmentAttributes::from_record(record, None)).unwrap_or_default()
}

fn tags_of(state: &AppState, shipment: &ShipmentId) -> Vec<TagRecord> {
    let mut tags = state.tags.filter(|t| &t.shipment_id == shipment);
    tags.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    tags
}

fn resource(state: &AppState, record: &ShipmentRecord, with_tags: bool) -> Result<Resource, AppError> {
    let tags = with_tags.then(|| tags_of(state, &record.id));
    Resource::new(RESOURCE, record.id, &ShipmentAttributes::from_record(record, tags))
}

/// Whether the caller may see tags inside the shipment representation.
async fn may_read_tags(
    state: &AppState,
    ctx: &RequestContext,
    shipment: &ShipmentRecord,
    facts: &GrantFacts,
) -> Result<bool, AppError> {
    if authorize(facts, Endpoint::Tags, PermissionLevel::ReadOnly) {
        return Ok(true);
    }
    let facts = access::resolve_facts(state, ctx, shipment, Endpoint::Tags, PermissionLevel::ReadOnly).await?;
    Ok(authorize(&facts, Endpoint::Tags, PermissionLevel::ReadOnly))
}

pub(crate) async fn record_history(
    state: &AppState,
    ctx: &RequestContext,
    before: Option<&Value>,
    after: &ShipmentRecord,
) -> Result<(), AppError> {
    let entry = HistoryEntry::record(
        RecordType::Shipment,
        *after.id.as_uuid(),
        after.id,
        ctx.user_id().map(ToString::to_string),
        before,
        &snapshot(after),
        Utc::now(),
    );
    state.record_history(entry).await
}

// ─── Requests ────────────────────────────────────────────────────────

/// Create a shipment.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateShipmentRequest {
    pub shipper_wallet_id: WalletId,
    pub carrier_wallet_id: WalletId,
    #[serde(default)]
    pub moderator_wallet_id: Option<WalletId>,
    pub storage_credentials_id: StorageCredentialsId,
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    #[serde(default)]
    pub gtx_required: bool,
    #[serde(default)]
    pub exception: ExceptionType,
    #[serde(default)]
    pub ship_from_location: Option<Location>,
    #[serde(default)]
    pub ship_to_location: Option<Location>,
    #[serde(flatten)]
    pub details: ShipmentDetails,
}

impl Validate for CreateShipmentRequest {
    fn validate(&self) -> Result<(), AppError> {
        self.details.validate()?;
        if let Some(location) = &self.ship_from_location {
            location.validate_as("ship_from_location")?;
        }
        if let Some(location) = &self.ship_to_location {
            location.validate_as("ship_to_location")?;
        }
        Ok(())
    }
}

/// Apply a lifecycle action.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ActionRequest {
    pub action_type: ShipmentAction,
    #[serde(flatten)]
    pub input: ActionInput,
}

/// Fields a PATCH may change. Outer `Option` is presence; inner `Option`
/// is an explicit null.
#[derive(Debug, Default)]
struct ShipmentPatch {
    carrier_wallet_id: Option<WalletId>,
    moderator_wallet_id: Option<Option<WalletId>>,
    gtx_required: Option<bool>,
    exception: Option<ExceptionType>,
    device_id: Option<Option<DeviceId>>,
    ship_from_location: Option<Option<Location>>,
    ship_to_location: Option<Option<Location>>,
    details: Map<String, Value>,
}

impl ShipmentPatch {
    fn parse(attrs: &Map<String, Value>) -> Result<Self, AppError> {
        if attrs.contains_key("state") {
            return Err(AppError::field(
                "state",
                "state is read-only; use shipment actions to change it",
            ));
        }
        if attrs.contains_key("asset_physical_id") {
            return Err(ShipmentError::AssetTagImmutable.into());
        }

        let detail_keys = match serde_json::to_value(ShipmentDetails::default()) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let details = attrs
            .iter()
            .filter(|(key, _)| detail_keys.contains_key(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        for location in ["ship_from_location", "ship_to_location"] {
            if let Some(Some(loc)) = attr::<Option<Location>>(attrs, location)? {
                loc.validate_as(location)?;
            }
        }
        let ignored: Vec<&str> = READ_ONLY_FIELDS
            .iter()
            .copied()
            .filter(|f| attrs.contains_key(*f))
            .collect();
        if !ignored.is_empty() {
            tracing::debug!(?ignored, "ignoring read-only shipment attributes");
        }

        Ok(Self {
            carrier_wallet_id: attr(attrs, "carrier_wallet_id")?,
            moderator_wallet_id: attr(attrs, "moderator_wallet_id")?,
            gtx_required: attr(attrs, "gtx_required")?,
            exception: attr(attrs, "exception")?,
            device_id: attr(attrs, "device_id")?,
            ship_from_location: attr(attrs, "ship_from_location")?,
            ship_to_location: attr(attrs, "ship_to_location")?,
            details,
        })
    }

    /// Apply to the live record. Validates before mutating.
    fn apply(&self, record: &mut ShipmentRecord, now: DateTime<Utc>) -> Result<(), AppError> {
        let details = if self.details.is_empty() {
            None
        } else {
            let mut merged = match serde_json::to_value(&record.details) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            };
            merged.extend(self.details.clone());
            let details: ShipmentDetails = serde_json::from_value(Value::Object(merged))
                .map_err(|e| AppError::Validation {
                    pointer: Some("/data/attributes".to_string()),
                    message: e.to_string(),
                })?;
            details.validate()?;
            Some(details)
        };

        let mut lifecycle = record.lifecycle.clone();
        if let Some(required) = self.gtx_required {
            lifecycle.set_gtx_required(required)?;
        }

        record.lifecycle = lifecycle;
        if let Some(details) = details {
            record.details = details;
        }
        if let Some(wallet) = &self.carrier_wallet_id {
            record.carrier_wallet_id = wallet.clone();
        }
        if let Some(wallet) = &self.moderator_wallet_id {
            record.moderator_wallet_id = wallet.clone();
        }
        if let Some(exception) = self.exception {
            record.exception = exception;
        }
        if let Some(location) = &self.ship_from_location {
            record.ship_from_location = location.clone();
        }
        if let Some(location) = &self.ship_to_location {
            record.ship_to_location = location.clone();
        }
        record.updated_at = now;
        Ok(())
    }
}

// ─── Router ──────────────────────────────────────────────────────────

/// Build the shipments router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/shipments",
            get(list_shipments)
                .post(create_shipment)
                .fallback(method_not_allowed),
        )
        .route(
            "/shipments/{id}",
            get(get_shipment)
                .patch(update_shipment)
                .fallback(method_not_allowed),
        )
        .route(
            "/shipments/{id}/actions",
            post(apply_action).fallback(method_not_allowed),
        )
        .route(
            "/shipments/{id}/history",
            get(get_history).fallback(method_not_allowed),
        )
}

// ─── Handlers ────────────────────────────────────────────────────────

/// GET /shipments — Shipments visible to the caller.
#[utoipa::path(
    get,
    path = "/shipments",
    responses(
        (status = 200, description = "Visible shipments", body = [ShipmentAttributes]),
        (status = 403, description = "Not authenticated", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
async fn list_shipments(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<JsonApi, AppError> {
    let visible = access::visible_shipments(&state, &ctx).await?;
    let resources = visible
        .iter()
        .map(|(shipment, facts)| {
            let with_tags = authorize(facts, Endpoint::Tags, PermissionLevel::ReadOnly);
            resource(&state, shipment, with_tags)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(JsonApi::many(resources))
}

/// POST /shipments — Create a shipment.
#[utoipa::path(
    post,
    path = "/shipments",
    request_body = CreateShipmentRequest,
    responses(
        (status = 201, description = "Shipment created", body = ShipmentAttributes),
        (status = 400, description = "Validation error", body = crate::error::ErrorBody),
        (status = 503, description = "Identity service unavailable", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
async fn create_shipment(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<JsonApi, AppError> {
    let user = ctx.require_user()?.clone();
    let req: CreateShipmentRequest = extract_validated_json(body)?;

    let identity = state.identity()?;
    let token = ctx.token.as_deref().unwrap_or_default();
    if !identity.wallet_is_active(token, &req.shipper_wallet_id).await? {
        return Err(AppError::field(
            "shipper_wallet_id",
            format!("User does not have access to wallet {}", req.shipper_wallet_id),
        ));
    }
    if !identity
        .storage_credentials_is_active(token, &req.storage_credentials_id)
        .await?
    {
        return Err(AppError::field(
            "storage_credentials_id",
            format!(
                "User does not have access to storage credentials {}",
                req.storage_credentials_id
            ),
        ));
    }

    let now = Utc::now();
    let mut record = ShipmentRecord {
        id: ShipmentId::new(),
        owner_id: user.id.clone(),
        organization_id: user.organization_id.clone(),
        shipper_wallet_id: req.shipper_wallet_id,
        carrier_wallet_id: req.carrier_wallet_id,
        moderator_wallet_id: req.moderator_wallet_id,
        storage_credentials_id: req.storage_credentials_id,
        vault_id: Uuid::new_v4(),
        device_id: None,
        exception: req.exception,
        lifecycle: ShipmentLifecycle::new(req.gtx_required),
        details: req.details,
        ship_from_location: req.ship_from_location,
        ship_to_location: req.ship_to_location,
        created_at: now,
        updated_at: now,
    };
    let change = devices::assign(&state, &ctx, &mut record, req.device_id).await?;

    state.shipments.insert(record.id, record.clone());
    if let Err(e) = state.persist(&record).await {
        state.shipments.remove(&record.id);
        devices::revert(&state, record.id, change).await;
        return Err(e);
    }
    record_history(&state, &ctx, None, &record).await?;
    tracing::info!(shipment_id = %record.id, owner_id = %record.owner_id, "shipment created");

    devices::publish_change(&state, &record, change).await;
    Ok(JsonApi::created(resource(&state, &record, true)?))
}

/// GET /shipments/{id} — Get a shipment.
#[utoipa::path(
    get,
    path = "/shipments/{id}",
    params(
        ("id" = Uuid, Path, description = "Shipment ID"),
        ("permission_link" = Option<Uuid>, Query, description = "Permission link granting anonymous read access"),
    ),
    responses(
        (status = 200, description = "Shipment found", body = ShipmentAttributes),
        (status = 403, description = "Permission denied", body = crate::error::ErrorBody),
        (status = 404, description = "Shipment not found", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
async fn get_shipment(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<ShipmentId>,
) -> Result<JsonApi, AppError> {
    let shipment = shipment_or_404(&state, &id)?;
    let facts = access::require(&state, &ctx, &shipment, Endpoint::Shipment, PermissionLevel::ReadOnly).await?;
    let with_tags = may_read_tags(&state, &ctx, &shipment, &facts).await?;
    Ok(JsonApi::one(resource(&state, &shipment, with_tags)?))
}

/// PATCH /shipments/{id} — Update a shipment.
#[utoipa::path(
    patch,
    path = "/shipments/{id}",
    params(("id" = Uuid, Path, description = "Shipment ID")),
    responses(
        (status = 200, description = "Shipment updated", body = ShipmentAttributes),
        (status = 400, description = "Validation error", body = crate::error::ErrorBody),
        (status = 403, description = "Permission denied", body = crate::error::ErrorBody),
        (status = 404, description = "Shipment not found", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
async fn update_shipment(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<ShipmentId>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<JsonApi, AppError> {
    let shipment = shipment_or_404(&state, &id)?;
    let facts = access::require(&state, &ctx, &shipment, Endpoint::Shipment, PermissionLevel::ReadWrite).await?;
    let patch = ShipmentPatch::parse(&extract_attributes(body)?)?;
    let before = snapshot(&shipment);

    // Device records are touched only once the rest of the patch is known good.
    let now = Utc::now();
    let mut working = shipment.clone();
    patch.apply(&mut working, now)?;
    let mut change = devices::DeviceChange::default();
    if let Some(requested) = patch.device_id {
        change = devices::assign(&state, &ctx, &mut working, requested).await?;
    }

    let committed = state
        .shipments
        .try_update(&id, |record| {
            if let Some(requested) = patch.device_id {
                if record.device_id != requested && record.lifecycle.state().is_in_progress() {
                    return Err(AppError::field(
                        "device_id",
                        format!(
                            "Cannot change the device of a Shipment in state {}",
                            record.lifecycle.state()
                        ),
                    ));
                }
            }
            patch.apply(record, now)?;
            if let Some(requested) = patch.device_id {
                record.device_id = requested;
            }
            Ok(record.clone())
        })
        .unwrap_or_else(|| Err(AppError::not_found("Shipment")));
    let updated = match committed {
        Ok(updated) => updated,
        Err(e) => {
            devices::revert(&state, id, change).await;
            return Err(e);
        }
    };

    state.persist(&updated).await?;
    record_history(&state, &ctx, Some(&before), &updated).await?;
    tracing::info!(shipment_id = %id, "shipment updated");

    if !change.is_empty() {
        devices::publish_change(&state, &updated, change).await;
    }
    let with_tags = may_read_tags(&state, &ctx, &updated, &facts).await?;
    Ok(JsonApi::one(resource(&state, &updated, with_tags)?))
}

/// POST /shipments/{id}/actions — Apply a lifecycle action.
#[utoipa::path(
    post,
    path = "/shipments/{id}/actions",
    params(("id" = Uuid, Path, description = "Shipment ID")),
    request_body = ActionRequest,
    responses(
        (status = 200, description = "Action applied", body = ShipmentAttributes),
        (status = 400, description = "Action not available", body = crate::error::ErrorBody),
        (status = 403, description = "Permission denied or asset tag mismatch", body = crate::error::ErrorBody),
        (status = 404, description = "Shipment not found", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
async fn apply_action(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<ShipmentId>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<JsonApi, AppError> {
    let shipment = shipment_or_404(&state, &id)?;
    let facts = access::require(&state, &ctx, &shipment, Endpoint::Shipment, PermissionLevel::ReadWrite).await?;
    let req: ActionRequest = extract_body(body)?;
    let before = snapshot(&shipment);

    let now = Utc::now();
    let (transition, mut updated) = state
        .shipments
        .try_update(&id, |record| {
            let transition = record.lifecycle.apply(req.action_type, &req.input, now)?;
            record.updated_at = now;
            Ok::<_, ShipmentError>((transition, record.clone()))
        })
        .ok_or_else(|| AppError::not_found("Shipment"))??;

    state.persist(&updated).await?;
    record_history(&state, &ctx, Some(&before), &updated).await?;
    tracing::info!(
        shipment_id = %id,
        action = %transition.record.action,
        from = %transition.record.from_state,
        to = %transition.record.to_state,
        "shipment action applied"
    );

    if transition.has_effect(TransitionEffect::UpdateDeviceShadow) {
        devices::publish_state(&state, &updated).await;
    }
    if transition.has_effect(TransitionEffect::RequestGtxValidation) {
        if let Some(validated) = request_gtx_validation(&state, &ctx, &updated).await? {
            updated = validated;
        }
    }

    let with_tags = may_read_tags(&state, &ctx, &updated, &facts).await?;
    Ok(JsonApi::one(resource(&state, &updated, with_tags)?))
}

/// Start GTX validation after pickup. A synchronous verdict is recorded;
/// failures leave validation PENDING.
async fn request_gtx_validation(
    state: &AppState,
    ctx: &RequestContext,
    shipment: &ShipmentRecord,
) -> Result<Option<ShipmentRecord>, AppError> {
    let Some(gtx) = &state.gtx else {
        tracing::warn!(shipment_id = %shipment.id, "GTX validation required but GTX is not configured");
        return Ok(None);
    };
    let Some(hash) = shipment.lifecycle.asset_physical_id() else {
        return Ok(None);
    };

    let valid = match gtx.request_validation(&shipment.id, &hash.to_hex()).await {
        Ok(GtxOutcome::Pending) => return Ok(None),
        Ok(GtxOutcome::Valid) => true,
        Ok(GtxOutcome::Invalid) => false,
        Err(e) => {
            tracing::warn!(shipment_id = %shipment.id, error = %e, "GTX validation request failed");
            return Ok(None);
        }
    };

    let before = snapshot(shipment);
    let Some(updated) = state.shipments.update(&shipment.id, |record| {
        record.lifecycle.record_gtx_result(valid);
        record.updated_at = Utc::now();
    }) else {
        return Ok(None);
    };
    state.persist(&updated).await?;
    record_history(state, ctx, Some(&before), &updated).await?;
    tracing::info!(shipment_id = %shipment.id, valid, "GTX validation recorded");
    Ok(Some(updated))
}

/// GET /shipments/{id}/history — Audit history.
///
/// Document entries need documents READ_ONLY; access request entries are
/// shown to the owner and parties only.
#[utoipa::path(
    get,
    path = "/shipments/{id}/history",
    params(("id" = Uuid, Path, description = "Shipment ID")),
    responses(
        (status = 200, description = "Change history, oldest first", body = [HistoryEntry]),
        (status = 403, description = "Permission denied", body = crate::error::ErrorBody),
        (status = 404, description = "Shipment not found", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
async fn get_history(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<ShipmentId>,
) -> Result<JsonApi, AppError> {
    let shipment = shipment_or_404(&state, &id)?;
    let facts = access::require(&state, &ctx, &shipment, Endpoint::Shipment, PermissionLevel::ReadOnly).await?;

    let documents = access::resolve_facts(&state, &ctx, &shipment, Endpoint::Documents, PermissionLevel::ReadOnly).await?;
    let show_documents = authorize(&documents, Endpoint::Documents, PermissionLevel::ReadOnly);
    let show_requests = facts.is_owner_or_party() || documents.is_owner_or_party();

    let mut entries = state.history.filter(|entry| {
        entry.shipment_id == id
            && match entry.record_type {
                RecordType::Shipment => true,
                RecordType::Document => show_documents,
                RecordType::AccessRequest => show_requests,
            }
    });
    entries.sort_by(|a, b| a.at.cmp(&b.at));

    let resources = entries
        .iter()
        .map(|entry| Resource::new("HistoryEntry", entry.id, entry))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(JsonApi::many(resources))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> ShipmentRecord {
        let now = Utc::now();
        ShipmentRecord {
            id: ShipmentId::new(),
            owner_id: UserId::new("owner").unwrap(),
            organization_id: None,
            shipper_wallet_id: WalletId::new("shipper").unwrap(),
            carrier_wallet_id: WalletId::new("carrier").unwrap(),
            moderator_wallet_id: None,
            storage_credentials_id: StorageCredentialsId::new("sc").unwrap(),
            vault_id: Uuid::new_v4(),
            device_id: None,
            exception: ExceptionType::None,
            lifecycle: ShipmentLifecycle::new(false),
            details: ShipmentDetails::default(),
            ship_from_location: None,
            ship_to_location: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn parse(value: Value) -> Result<ShipmentPatch, AppError> {
        ShipmentPatch::parse(value.as_object().unwrap())
    }

    #[test]
    fn state_is_read_only() {
        let err = parse(json!({"state": "DELIVERED"})).unwrap_err();
        assert!(matches!(err, AppError::Validation { pointer: Some(ref p), .. } if p == "/data/attributes/state"));
    }

    #[test]
    fn asset_tag_cannot_be_patched() {
        let err = parse(json!({"asset_physical_id": "abc"})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "asset_physical_id is write-once and can only be set by the PICK_UP action"
        );
    }

    #[test]
    fn detail_fields_merge_onto_existing_details() {
        let mut s = record();
        s.details.vessel_name = Some("Ever Given".into());
        let patch = parse(json!({"voyage_number": "V-1", "owner_id": "someone-else"})).unwrap();
        patch.apply(&mut s, Utc::now()).unwrap();
        assert_eq!(s.details.vessel_name.as_deref(), Some("Ever Given"));
        assert_eq!(s.details.voyage_number.as_deref(), Some("V-1"));
        assert_eq!(s.owner_id.as_str(), "owner");
    }

    #[test]
    fn nulls_clear_optional_fields() {
        let mut s = record();
        s.moderator_wallet_id = Some(WalletId::new("mod").unwrap());
        let patch = parse(json!({"moderator_wallet_id": null})).unwrap();
        patch.apply(&mut s, Utc::now()).unwrap();
        assert!(s.moderator_wallet_id.is_none());
    }

    #[test]
    fn gtx_required_locked_after_pickup() {
        let mut s = record();
        s.lifecycle
            .apply(ShipmentAction::PickUp, &ActionInput::default(), Utc::now())
            .unwrap();
        let before = s.clone();
        let patch = parse(json!({"gtx_required": true, "vessel_name": "x"})).unwrap();
        let err = patch.apply(&mut s, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("gtx_required"));
        assert_eq!(s, before);
    }

    #[test]
    fn invalid_detail_is_rejected_without_mutation() {
        let mut s = record();
        let before = s.clone();
        let patch = parse(json!({"weight_gross_kgs": -3.0})).unwrap();
        assert!(patch.apply(&mut s, Utc::now()).is_err());
        assert_eq!(s, before);
    }

    #[test]
    fn attributes_expose_hashed_tag_and_flatten_details() {
        let mut s = record();
        s.details.bill_master = Some("BM-1".into());
        s.lifecycle
            .apply(
                ShipmentAction::PickUp,
                &ActionInput {
                    asset_physical_id: Some("tag-1".into()),
                    raw_asset_physical_id: None,
                },
                Utc::now(),
            )
            .unwrap();
        let value = snapshot(&s);
        assert_eq!(value["state"], "IN_TRANSIT");
        assert_eq!(value["bill_master"], "BM-1");
        let hash = value["asset_physical_id"].as_str().unwrap();
        assert_eq!(hash.len(), 64);
        assert_ne!(hash, "tag-1");
        assert!(value.get("tags").is_none());
    }
}

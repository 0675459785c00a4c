//! # Access Requests
//!
//! A user who is neither owner nor party asks for per-endpoint access to a
//! shipment; the owner (or a member of the owner's organization) approves or
//! denies. Parties may read requests but not decide them. Approved requests
//! feed grant resolution. The rules for who may change what live in
//! [`transmission_state::AccessRequest::apply_update`]; this module decides
//! which [`UpdateActor`] the caller is.
//!
//! | Method | Path | Access |
//! |--------|------|--------|
//! | POST | `/shipments/{id}/access_requests` | any user except the owner |
//! | GET | `/shipments/{id}/access_requests` | owner/party: all; others: own |
//! | GET | `/shipments/{id}/access_requests/{ar_id}` | requester, owner or party |
//! | PATCH | `/shipments/{id}/access_requests/{ar_id}` | requester or owner |
//! | GET | `/access_requests` | the caller's own requests |

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use transmission_core::{AccessRequestId, ShipmentId};
use transmission_state::{AccessRequest, AccessRequestUpdate, PermissionSet, UpdateActor};
use utoipa::IntoParams;

use crate::access::{self, shipment_or_404};
use crate::auth::{AuthenticatedUser, RequestContext};
use crate::error::AppError;
use crate::history::{HistoryEntry, RecordType};
use crate::jsonapi::{extract_body, JsonApi, Resource};
use crate::records::ShipmentRecord;
use crate::routes::method_not_allowed;
use crate::state::AppState;

pub const RESOURCE: &str = "AccessRequest";

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AccessRequestQuery {
    /// `true`, `false`, or `none` for pending requests.
    pub approved: Option<String>,
}

/// Decoded `?approved=` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApprovalFilter {
    Any,
    Is(Option<bool>),
}

impl ApprovalFilter {
    fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw.map(str::to_ascii_lowercase).as_deref() {
            None | Some("") => Ok(Self::Any),
            Some("true") => Ok(Self::Is(Some(true))),
            Some("false") => Ok(Self::Is(Some(false))),
            Some("none") | Some("null") => Ok(Self::Is(None)),
            Some(other) => Err(AppError::invalid(format!(
                "Invalid approved filter \"{other}\"; expected true, false or none"
            ))),
        }
    }

    fn matches(self, request: &AccessRequest) -> bool {
        match self {
            Self::Any => true,
            Self::Is(approved) => request.approved == approved,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/access_requests",
            get(list_own_requests).fallback(method_not_allowed),
        )
        .route(
            "/shipments/{id}/access_requests",
            get(list_requests)
                .post(create_request)
                .fallback(method_not_allowed),
        )
        .route(
            "/shipments/{id}/access_requests/{ar_id}",
            get(get_request)
                .patch(update_request)
                .fallback(method_not_allowed),
        )
}

fn resource(request: &AccessRequest) -> Result<Resource, AppError> {
    Resource::new(RESOURCE, request.id, request)
}

fn resources(mut requests: Vec<AccessRequest>) -> Result<JsonApi, AppError> {
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let resources = requests.iter().map(resource).collect::<Result<Vec<_>, _>>()?;
    Ok(JsonApi::many(resources))
}

fn snapshot(request: &AccessRequest) -> Value {
    serde_json::to_value(request).unwrap_or_default()
}

async fn record_history(
    state: &AppState,
    user: &AuthenticatedUser,
    before: Option<&Value>,
    after: &AccessRequest,
) -> Result<(), AppError> {
    let entry = HistoryEntry::record(
        RecordType::AccessRequest,
        *after.id.as_uuid(),
        after.shipment_id,
        Some(user.id.to_string()),
        before,
        &snapshot(after),
        Utc::now(),
    );
    state.record_history(entry).await
}

fn request_or_404(state: &AppState, shipment: &ShipmentId, id: &AccessRequestId) -> Result<AccessRequest, AppError> {
    state
        .access_requests
        .get(id)
        .filter(|ar| &ar.shipment_id == shipment)
        .ok_or_else(|| AppError::not_found("AccessRequest"))
}

/// Owner, organization member or party of the shipment.
async fn manages(state: &AppState, ctx: &RequestContext, shipment: &ShipmentRecord) -> Result<bool, AppError> {
    let Some(user) = &ctx.user else {
        return Ok(false);
    };
    Ok(shipment.is_owned_by(user) || access::is_party(state, ctx, shipment).await?)
}

/// Role of the caller for an update. Only the owner or a member of the
/// owner's organization decides; wallet parties do not.
fn actor_for(user: &AuthenticatedUser, request: &AccessRequest, owns: bool, deciding: bool) -> UpdateActor {
    let is_requester = request.requester_id == user.id;
    match (is_requester, owns) {
        (true, true) if deciding => UpdateActor::ShipmentOwner,
        (true, _) => UpdateActor::Requester,
        (false, true) => UpdateActor::ShipmentOwner,
        (false, false) => UpdateActor::Other,
    }
}

/// GET /access_requests — The caller's own requests.
#[utoipa::path(
    get,
    path = "/access_requests",
    params(AccessRequestQuery),
    responses(
        (status = 200, description = "Access requests filed by the caller", body = [AccessRequest]),
        (status = 400, description = "Invalid filter", body = crate::error::ErrorBody),
        (status = 403, description = "Not authenticated", body = crate::error::ErrorBody),
    ),
    tag = "access_requests"
)]
async fn list_own_requests(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<AccessRequestQuery>,
) -> Result<JsonApi, AppError> {
    let user = ctx.require_user()?;
    let filter = ApprovalFilter::parse(query.approved.as_deref())?;
    resources(
        state
            .access_requests
            .filter(|ar| ar.requester_id == user.id && filter.matches(ar)),
    )
}

/// GET /shipments/{id}/access_requests — Requests on one shipment.
#[utoipa::path(
    get,
    path = "/shipments/{id}/access_requests",
    params(("id" = Uuid, Path, description = "Shipment ID"), AccessRequestQuery),
    responses(
        (status = 200, description = "Access requests", body = [AccessRequest]),
        (status = 403, description = "Not authenticated", body = crate::error::ErrorBody),
        (status = 404, description = "Shipment not found", body = crate::error::ErrorBody),
    ),
    tag = "access_requests"
)]
async fn list_requests(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<ShipmentId>,
    Query(query): Query<AccessRequestQuery>,
) -> Result<JsonApi, AppError> {
    let user = ctx.require_user()?;
    let shipment = shipment_or_404(&state, &id)?;
    let filter = ApprovalFilter::parse(query.approved.as_deref())?;
    let all = manages(&state, &ctx, &shipment).await?;
    resources(state.access_requests.filter(|ar| {
        ar.shipment_id == id && (all || ar.requester_id == user.id) && filter.matches(ar)
    }))
}

/// POST /shipments/{id}/access_requests — Request access.
#[utoipa::path(
    post,
    path = "/shipments/{id}/access_requests",
    params(("id" = Uuid, Path, description = "Shipment ID")),
    request_body = PermissionSet,
    responses(
        (status = 201, description = "Access request filed", body = AccessRequest),
        (status = 400, description = "Invalid permission set", body = crate::error::ErrorBody),
        (status = 403, description = "Owner or not authenticated", body = crate::error::ErrorBody),
        (status = 404, description = "Shipment not found", body = crate::error::ErrorBody),
    ),
    tag = "access_requests"
)]
async fn create_request(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<ShipmentId>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<JsonApi, AppError> {
    let user = ctx.require_user()?.clone();
    let shipment = shipment_or_404(&state, &id)?;
    let permissions: PermissionSet = extract_body(body)?;

    let request = AccessRequest::create(
        id,
        user.id.clone(),
        permissions,
        shipment.is_owned_by(&user),
        Utc::now(),
    )?;
    state.access_requests.insert(request.id, request.clone());
    state.persist(&request).await?;
    record_history(&state, &user, None, &request).await?;
    tracing::info!(shipment_id = %id, access_request_id = %request.id, requester_id = %user.id, "access request filed");

    Ok(JsonApi::created(resource(&request)?))
}

/// GET /shipments/{id}/access_requests/{ar_id} — One request.
#[utoipa::path(
    get,
    path = "/shipments/{id}/access_requests/{ar_id}",
    params(
        ("id" = Uuid, Path, description = "Shipment ID"),
        ("ar_id" = Uuid, Path, description = "Access request ID"),
    ),
    responses(
        (status = 200, description = "Access request", body = AccessRequest),
        (status = 403, description = "Permission denied", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "access_requests"
)]
async fn get_request(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((id, ar_id)): Path<(ShipmentId, AccessRequestId)>,
) -> Result<JsonApi, AppError> {
    let user = ctx.require_user()?;
    let shipment = shipment_or_404(&state, &id)?;
    let request = request_or_404(&state, &id, &ar_id)?;
    if request.requester_id != user.id && !manages(&state, &ctx, &shipment).await? {
        return Err(AppError::forbidden());
    }
    Ok(JsonApi::one(resource(&request)?))
}

/// PATCH /shipments/{id}/access_requests/{ar_id} — Edit, approve or deny.
#[utoipa::path(
    patch,
    path = "/shipments/{id}/access_requests/{ar_id}",
    params(
        ("id" = Uuid, Path, description = "Shipment ID"),
        ("ar_id" = Uuid, Path, description = "Access request ID"),
    ),
    request_body = AccessRequestUpdate,
    responses(
        (status = 200, description = "Access request updated", body = AccessRequest),
        (status = 400, description = "Invalid update", body = crate::error::ErrorBody),
        (status = 403, description = "Not permitted", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "access_requests"
)]
async fn update_request(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((id, ar_id)): Path<(ShipmentId, AccessRequestId)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<JsonApi, AppError> {
    let user = ctx.require_user()?.clone();
    let shipment = shipment_or_404(&state, &id)?;
    let current = request_or_404(&state, &id, &ar_id)?;
    let update: AccessRequestUpdate = extract_body(body)?;

    let actor = actor_for(&user, &current, shipment.is_owned_by(&user), update.approved.is_some());
    let before = snapshot(&current);

    let now = Utc::now();
    let updated = state
        .access_requests
        .try_update(&ar_id, |ar| {
            ar.apply_update(&update, actor, &user.id, now)?;
            Ok::<_, AppError>(ar.clone())
        })
        .ok_or_else(|| AppError::not_found("AccessRequest"))??;

    state.persist(&updated).await?;
    record_history(&state, &user, Some(&before), &updated).await?;
    tracing::info!(
        shipment_id = %id,
        access_request_id = %ar_id,
        ?actor,
        approved = ?updated.approved,
        "access request updated"
    );
    Ok(JsonApi::one(resource(&updated)?))
}

//! # Permission Links
//!
//! Shareable links granting anonymous READ_ONLY access to a shipment's
//! core resources until they expire. Only the owner or a party manages them.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use transmission_core::{PermissionLinkId, ShipmentId};
use utoipa::ToSchema;

use crate::access::{self, shipment_or_404};
use crate::auth::RequestContext;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_text, Validate};
use crate::jsonapi::{JsonApi, Resource};
use crate::records::{PermissionLinkRecord, MAX_FIELD_LEN};
use crate::routes::method_not_allowed;
use crate::state::AppState;

pub const RESOURCE: &str = "PermissionLink";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePermissionLinkRequest {
    pub name: String,
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
}

impl CreatePermissionLinkRequest {
    fn validate_at(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        require_text("name", &self.name, MAX_FIELD_LEN)?;
        if self.expiration_date.is_some_and(|at| at <= now) {
            return Err(AppError::field(
                "expiration_date",
                "The expiration date should be greater than actual date",
            ));
        }
        Ok(())
    }
}

impl Validate for CreatePermissionLinkRequest {
    fn validate(&self) -> Result<(), AppError> {
        self.validate_at(Utc::now())
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/shipments/{id}/permission_links",
            get(list_links).post(create_link).fallback(method_not_allowed),
        )
        .route(
            "/shipments/{id}/permission_links/{link_id}",
            delete(delete_link).fallback(method_not_allowed),
        )
}

/// GET /shipments/{id}/permission_links — List links.
#[utoipa::path(
    get,
    path = "/shipments/{id}/permission_links",
    params(("id" = Uuid, Path, description = "Shipment ID")),
    responses(
        (status = 200, description = "Permission links", body = [PermissionLinkRecord]),
        (status = 403, description = "Not the owner or a party", body = crate::error::ErrorBody),
    ),
    tag = "permission_links"
)]
async fn list_links(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<ShipmentId>,
) -> Result<JsonApi, AppError> {
    let shipment = shipment_or_404(&state, &id)?;
    access::require_owner_or_party(&state, &ctx, &shipment).await?;

    let mut links = state.permission_links.filter(|l| l.shipment_id == id);
    links.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    let resources = links
        .iter()
        .map(|link| Resource::new(RESOURCE, link.id, link))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(JsonApi::many(resources))
}

/// POST /shipments/{id}/permission_links — Create a link.
#[utoipa::path(
    post,
    path = "/shipments/{id}/permission_links",
    params(("id" = Uuid, Path, description = "Shipment ID")),
    request_body = CreatePermissionLinkRequest,
    responses(
        (status = 201, description = "Link created", body = PermissionLinkRecord),
        (status = 400, description = "Validation error", body = crate::error::ErrorBody),
        (status = 403, description = "Not the owner or a party", body = crate::error::ErrorBody),
    ),
    tag = "permission_links"
)]
async fn create_link(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<ShipmentId>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<JsonApi, AppError> {
    let shipment = shipment_or_404(&state, &id)?;
    access::require_owner_or_party(&state, &ctx, &shipment).await?;
    let req: CreatePermissionLinkRequest = extract_validated_json(body)?;

    let link = PermissionLinkRecord {
        id: PermissionLinkId::new(),
        shipment_id: id,
        name: req.name,
        expiration_date: req.expiration_date,
        created_at: Utc::now(),
    };
    state.permission_links.insert(link.id, link.clone());
    state.persist(&link).await?;
    tracing::info!(shipment_id = %id, link_id = %link.id, expires = ?link.expiration_date, "permission link created");

    Ok(JsonApi::created(Resource::new(RESOURCE, link.id, &link)?))
}

/// DELETE /shipments/{id}/permission_links/{link_id} — Revoke a link.
#[utoipa::path(
    delete,
    path = "/shipments/{id}/permission_links/{link_id}",
    params(
        ("id" = Uuid, Path, description = "Shipment ID"),
        ("link_id" = Uuid, Path, description = "Permission link ID"),
    ),
    responses(
        (status = 204, description = "Link revoked"),
        (status = 403, description = "Not the owner or a party", body = crate::error::ErrorBody),
        (status = 404, description = "Link not found", body = crate::error::ErrorBody),
    ),
    tag = "permission_links"
)]
async fn delete_link(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((id, link_id)): Path<(ShipmentId, PermissionLinkId)>,
) -> Result<impl IntoResponse, AppError> {
    let shipment = shipment_or_404(&state, &id)?;
    access::require_owner_or_party(&state, &ctx, &shipment).await?;

    match state.permission_links.get(&link_id) {
        Some(link) if link.shipment_id == id => {}
        _ => return Err(AppError::not_found("PermissionLink")),
    }
    state.permission_links.remove(&link_id);
    state
        .persist_delete::<PermissionLinkRecord>(*link_id.as_uuid())
        .await?;
    tracing::info!(shipment_id = %id, %link_id, "permission link revoked");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expiration_must_be_in_the_future() {
        let now = Utc::now();
        let req = |expiration_date| CreatePermissionLinkRequest {
            name: "customs".into(),
            expiration_date,
        };
        assert!(req(None).validate_at(now).is_ok());
        assert!(req(Some(now + Duration::hours(1))).validate_at(now).is_ok());
        assert!(req(Some(now)).validate_at(now).is_err());

        let err = req(Some(now - Duration::hours(1))).validate_at(now).unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation { pointer: Some(ref p), .. } if p == "/data/attributes/expiration_date"
        ));
    }
}

//! # Shipment Tags
//!
//! Free-form `(tag_type, tag_value)` labels. Tags are read as part of the
//! shipment representation; this module only creates and removes them.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use transmission_core::{Endpoint, PermissionLevel, ShipmentId, TagId};
use utoipa::ToSchema;

use crate::access::{self, shipment_or_404};
use crate::auth::RequestContext;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_text, Validate};
use crate::jsonapi::{JsonApi, Resource};
use crate::records::TagRecord;
use crate::routes::method_not_allowed;
use crate::state::AppState;

pub const RESOURCE: &str = "Tag";

const MAX_TAG_LEN: usize = 50;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTagRequest {
    pub tag_type: String,
    pub tag_value: String,
}

impl Validate for CreateTagRequest {
    fn validate(&self) -> Result<(), AppError> {
        require_text("tag_type", &self.tag_type, MAX_TAG_LEN)?;
        require_text("tag_value", &self.tag_value, MAX_TAG_LEN)
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/shipments/{id}/tags",
            post(create_tag).fallback(method_not_allowed),
        )
        .route(
            "/shipments/{id}/tags/{tag_id}",
            delete(delete_tag).fallback(method_not_allowed),
        )
}

/// POST /shipments/{id}/tags — Tag a shipment.
#[utoipa::path(
    post,
    path = "/shipments/{id}/tags",
    params(("id" = Uuid, Path, description = "Shipment ID")),
    request_body = CreateTagRequest,
    responses(
        (status = 201, description = "Tag created", body = TagRecord),
        (status = 400, description = "Validation error or duplicate tag", body = crate::error::ErrorBody),
        (status = 403, description = "Permission denied", body = crate::error::ErrorBody),
    ),
    tag = "tags"
)]
async fn create_tag(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<ShipmentId>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<JsonApi, AppError> {
    let shipment = shipment_or_404(&state, &id)?;
    access::require(&state, &ctx, &shipment, Endpoint::Tags, PermissionLevel::ReadWrite).await?;
    let user = ctx.require_user()?;
    let req: CreateTagRequest = extract_validated_json(body)?;

    let tag_type = req.tag_type.trim().to_string();
    let tag_value = req.tag_value.trim().to_string();
    let duplicate = !state
        .tags
        .filter(|t| t.shipment_id == id && t.tag_type == tag_type && t.tag_value == tag_value)
        .is_empty();
    if duplicate {
        return Err(AppError::Conflict(format!(
            "Tag {tag_type}={tag_value} already exists on this Shipment"
        )));
    }

    let tag = TagRecord {
        id: TagId::new(),
        shipment_id: id,
        owner_id: user.id.clone(),
        tag_type,
        tag_value,
        created_at: Utc::now(),
    };
    state.tags.insert(tag.id, tag.clone());
    state.persist(&tag).await?;
    tracing::info!(shipment_id = %id, tag_id = %tag.id, "tag added");

    Ok(JsonApi::created(Resource::new(RESOURCE, tag.id, &tag)?))
}

/// DELETE /shipments/{id}/tags/{tag_id} — Remove a tag.
#[utoipa::path(
    delete,
    path = "/shipments/{id}/tags/{tag_id}",
    params(
        ("id" = Uuid, Path, description = "Shipment ID"),
        ("tag_id" = Uuid, Path, description = "Tag ID"),
    ),
    responses(
        (status = 204, description = "Tag removed"),
        (status = 403, description = "Permission denied", body = crate::error::ErrorBody),
        (status = 404, description = "Tag not found", body = crate::error::ErrorBody),
    ),
    tag = "tags"
)]
async fn delete_tag(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((id, tag_id)): Path<(ShipmentId, TagId)>,
) -> Result<impl IntoResponse, AppError> {
    let shipment = shipment_or_404(&state, &id)?;
    access::require(&state, &ctx, &shipment, Endpoint::Tags, PermissionLevel::ReadWrite).await?;

    match state.tags.get(&tag_id) {
        Some(tag) if tag.shipment_id == id => {}
        _ => return Err(AppError::not_found("Tag")),
    }
    state.tags.remove(&tag_id);
    state.persist_delete::<TagRecord>(*tag_id.as_uuid()).await?;
    tracing::info!(shipment_id = %id, %tag_id, "tag removed");
    Ok(StatusCode::NO_CONTENT)
}

//! # Shipment Notes
//!
//! Append-only free-text notes. Once written a note cannot be edited or
//! removed.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use transmission_core::{Endpoint, NoteId, PermissionLevel, ShipmentId};
use utoipa::{IntoParams, ToSchema};

use crate::access::{self, shipment_or_404};
use crate::auth::RequestContext;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_text, Validate};
use crate::jsonapi::{JsonApi, Resource};
use crate::records::NoteRecord;
use crate::routes::method_not_allowed;
use crate::state::AppState;

pub const RESOURCE: &str = "Note";

const MAX_MESSAGE_LEN: usize = 500;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateNoteRequest {
    pub message: String,
}

impl Validate for CreateNoteRequest {
    fn validate(&self) -> Result<(), AppError> {
        require_text("message", &self.message, MAX_MESSAGE_LEN)
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NoteQuery {
    /// Case-insensitive substring of the message.
    pub search: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/shipments/{id}/notes",
        get(list_notes)
            .post(create_note)
            .fallback(method_not_allowed),
    )
}

fn matches_search(note: &NoteRecord, needle: Option<&str>) -> bool {
    needle.map_or(true, |needle| {
        note.message.to_lowercase().contains(&needle.to_lowercase())
    })
}

/// GET /shipments/{id}/notes — List notes.
#[utoipa::path(
    get,
    path = "/shipments/{id}/notes",
    params(("id" = Uuid, Path, description = "Shipment ID"), NoteQuery),
    responses(
        (status = 200, description = "Notes, oldest first", body = [NoteRecord]),
        (status = 403, description = "Permission denied", body = crate::error::ErrorBody),
    ),
    tag = "notes"
)]
async fn list_notes(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<ShipmentId>,
    Query(query): Query<NoteQuery>,
) -> Result<JsonApi, AppError> {
    let shipment = shipment_or_404(&state, &id)?;
    access::require(&state, &ctx, &shipment, Endpoint::Notes, PermissionLevel::ReadOnly).await?;

    let needle = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let mut notes = state
        .notes
        .filter(|n| n.shipment_id == id && matches_search(n, needle));
    notes.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let resources = notes
        .iter()
        .map(|note| Resource::new(RESOURCE, note.id, note))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(JsonApi::many(resources))
}

/// POST /shipments/{id}/notes — Add a note.
#[utoipa::path(
    post,
    path = "/shipments/{id}/notes",
    params(("id" = Uuid, Path, description = "Shipment ID")),
    request_body = CreateNoteRequest,
    responses(
        (status = 201, description = "Note created", body = NoteRecord),
        (status = 400, description = "Validation error", body = crate::error::ErrorBody),
        (status = 403, description = "Permission denied", body = crate::error::ErrorBody),
    ),
    tag = "notes"
)]
async fn create_note(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<ShipmentId>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<JsonApi, AppError> {
    let user = ctx.require_user()?.clone();
    let shipment = shipment_or_404(&state, &id)?;
    access::require(&state, &ctx, &shipment, Endpoint::Notes, PermissionLevel::ReadWrite).await?;
    let req: CreateNoteRequest = extract_validated_json(body)?;

    let note = NoteRecord {
        id: NoteId::new(),
        shipment_id: id,
        author_id: user.id,
        message: req.message,
        created_at: Utc::now(),
    };
    state.notes.insert(note.id, note.clone());
    state.persist(&note).await?;
    tracing::info!(shipment_id = %id, note_id = %note.id, "note added");

    Ok(JsonApi::created(Resource::new(RESOURCE, note.id, &note)?))
}

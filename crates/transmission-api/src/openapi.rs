//! # OpenAPI Specification Assembly
//!
//! Collects every utoipa-documented route into one OpenAPI 3.1 document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the bearer JWT security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "User token issued by the identity provider. Device ingestion and storage notifications do not use it.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Transmission API",
        version = "0.1.0",
        description = "Shipment tracking service.\n\nProvides:\n- **Shipments** and their lifecycle (pick-up, arrival, drop-off, exceptions)\n- **Access requests** and **permission links** for third-party access\n- **Documents** and bulk **imports** backed by presigned object storage\n- Signed **device** tracking and telemetry ingestion\n- Field-level **history** of every change\n\nResponses follow the JSON:API document shape. Requests carrying a `permission_link` query parameter may read a shipment anonymously.",
        license(name = "AGPL-3.0-or-later")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        // ── Shipments ────────────────────────────────────────────────────
        crate::routes::shipments::list_shipments,
        crate::routes::shipments::create_shipment,
        crate::routes::shipments::get_shipment,
        crate::routes::shipments::update_shipment,
        crate::routes::shipments::apply_action,
        crate::routes::shipments::get_history,
        // ── Tags & notes ─────────────────────────────────────────────────
        crate::routes::tags::create_tag,
        crate::routes::tags::delete_tag,
        crate::routes::notes::list_notes,
        crate::routes::notes::create_note,
        // ── Permission links ─────────────────────────────────────────────
        crate::routes::permission_links::list_links,
        crate::routes::permission_links::create_link,
        crate::routes::permission_links::delete_link,
        // ── Access requests ──────────────────────────────────────────────
        crate::routes::access_requests::list_own_requests,
        crate::routes::access_requests::list_requests,
        crate::routes::access_requests::create_request,
        crate::routes::access_requests::get_request,
        crate::routes::access_requests::update_request,
        // ── Documents ────────────────────────────────────────────────────
        crate::routes::documents::list_documents,
        crate::routes::documents::create_document,
        crate::routes::documents::get_document,
        crate::routes::documents::update_document,
        crate::routes::documents::storage_event,
        // ── Imports ──────────────────────────────────────────────────────
        crate::routes::imports::list_imports,
        crate::routes::imports::create_import,
        crate::routes::imports::get_import,
        crate::routes::imports::update_import,
        // ── Devices ──────────────────────────────────────────────────────
        crate::routes::devices::ingest_tracking,
        crate::routes::devices::ingest_telemetry,
        crate::routes::devices::get_tracking,
        crate::routes::devices::get_telemetry,
    ),
    components(
        schemas(
            // ── Shared ──────────────────────────────────────────────────
            crate::error::ErrorBody,
            crate::error::ErrorDetail,
            crate::error::ErrorSource,
            transmission_core::PermissionLevel,
            transmission_core::Endpoint,
            // ── Shipments ───────────────────────────────────────────────
            crate::routes::shipments::ShipmentAttributes,
            crate::routes::shipments::CreateShipmentRequest,
            crate::routes::shipments::ActionRequest,
            crate::records::ShipmentDetails,
            crate::records::Location,
            transmission_state::ShipmentState,
            transmission_state::ShipmentAction,
            transmission_state::GtxValidation,
            transmission_state::ExceptionType,
            transmission_state::ActionInput,
            // ── Tags, notes, links ──────────────────────────────────────
            crate::records::TagRecord,
            crate::routes::tags::CreateTagRequest,
            crate::records::NoteRecord,
            crate::routes::notes::CreateNoteRequest,
            crate::records::PermissionLinkRecord,
            crate::routes::permission_links::CreatePermissionLinkRequest,
            // ── Access requests ─────────────────────────────────────────
            transmission_state::AccessRequest,
            transmission_state::PermissionSet,
            transmission_state::PartialPermissionSet,
            transmission_state::AccessRequestUpdate,
            // ── Documents & imports ─────────────────────────────────────
            crate::routes::documents::DocumentAttributes,
            crate::routes::documents::CreateDocumentRequest,
            crate::routes::documents::StorageEvent,
            crate::records::DocumentType,
            crate::records::FileType,
            crate::storage::UploadDescriptor,
            transmission_state::UploadStatus,
            transmission_state::ProcessingStatus,
            crate::routes::imports::ImportAttributes,
            crate::routes::imports::CreateImportRequest,
            crate::records::ImportFileType,
            // ── Devices ─────────────────────────────────────────────────
            crate::routes::devices::IngestBody,
            crate::routes::devices::SignedPayloadBody,
            crate::routes::devices::TelemetryAttributes,
            // ── History ─────────────────────────────────────────────────
            crate::history::HistoryEntry,
            crate::history::FieldChange,
            crate::history::RecordType,
        ),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "shipments", description = "Shipments, lifecycle actions and history"),
        (name = "tags", description = "Shipment tags"),
        (name = "notes", description = "Shipment notes"),
        (name = "permission_links", description = "Anonymous read-only links"),
        (name = "access_requests", description = "Scoped third-party access"),
        (name = "documents", description = "Shipment documents and storage notifications"),
        (name = "imports", description = "Bulk shipment imports"),
        (name = "devices", description = "Signed device data and its reads"),
    )
)]
pub struct ApiDoc;

/// Router serving the OpenAPI document.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(serve_openapi))
}

async fn serve_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

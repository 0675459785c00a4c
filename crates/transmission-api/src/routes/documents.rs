//! # Shipment Documents
//!
//! The service tracks document metadata; bytes go straight to object
//! storage through presigned URLs. A document starts PENDING, and becomes
//! COMPLETE when storage reports the upload (`POST /documents/events`) or
//! the client says so. COMPLETE documents carry a download URL.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use transmission_core::{DocumentId, Endpoint, PermissionLevel, ShipmentId, UserId};
use transmission_state::UploadStatus;
use utoipa::{IntoParams, ToSchema};

use crate::access::{self, shipment_or_404};
use crate::auth::RequestContext;
use crate::error::AppError;
use crate::extractors::{check_opt_len, extract_validated_json, require_text, Validate};
use crate::history::{HistoryEntry, RecordType};
use crate::jsonapi::{extract_attributes, extract_body, JsonApi, Resource};
use crate::records::{DocumentRecord, DocumentType, FileType, ShipmentRecord, MAX_FIELD_LEN};
use crate::routes::{attr, method_not_allowed};
use crate::state::AppState;
use crate::storage::{events_token_matches, Bucket, ObjectKey, UploadDescriptor};

pub const RESOURCE: &str = "Document";

/// Header storage notifications authenticate with.
pub const EVENTS_TOKEN_HEADER: &str = "x-storage-events-token";

const MAX_DESCRIPTION_LEN: usize = 1000;

// ─── Representation ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DocumentAttributes {
    pub shipment_id: ShipmentId,
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub document_type: DocumentType,
    pub file_type: FileType,
    pub upload_status: UploadStatus,
    /// Presigned POST for the initial upload. Returned on creation only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadDescriptor>,
    /// Presigned GET, present once the upload is COMPLETE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentAttributes {
    fn from_record(record: &DocumentRecord) -> Self {
        Self {
            shipment_id: record.shipment_id,
            owner_id: record.owner_id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            document_type: record.document_type,
            file_type: record.file_type,
            upload_status: record.upload_status,
            upload: None,
            download_url: None,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

fn snapshot(record: &DocumentRecord) -> Value {
    serde_json::to_value(DocumentAttributes::from_record(record)).unwrap_or_default()
}

/// Representation with a download URL for COMPLETE documents.
async fn resource(state: &AppState, record: &DocumentRecord) -> Result<Resource, AppError> {
    let mut attributes = DocumentAttributes::from_record(record);
    if record.upload_status == UploadStatus::Complete {
        match state.storage.object_exists(Bucket::Documents, &record.object_key).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                document_id = %record.id,
                key = %record.object_key,
                "document marked COMPLETE but object is missing from storage"
            ),
            Err(e) => tracing::warn!(document_id = %record.id, error = %e, "storage existence check failed"),
        }
        attributes.download_url = Some(
            state
                .storage
                .presign_download(Bucket::Documents, &record.object_key, Utc::now()),
        );
    }
    Resource::new(RESOURCE, record.id, &attributes)
}

async fn record_history(
    state: &AppState,
    actor: Option<String>,
    before: Option<&Value>,
    after: &DocumentRecord,
) -> Result<(), AppError> {
    let entry = HistoryEntry::record(
        RecordType::Document,
        *after.id.as_uuid(),
        after.shipment_id,
        actor,
        before,
        &snapshot(after),
        Utc::now(),
    );
    state.record_history(entry).await
}

fn document_or_404(state: &AppState, shipment: &ShipmentId, id: &DocumentId) -> Result<DocumentRecord, AppError> {
    state
        .documents
        .get(id)
        .filter(|d| &d.shipment_id == shipment)
        .ok_or_else(|| AppError::not_found("Document"))
}

// ─── Requests ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDocumentRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub document_type: DocumentType,
    pub file_type: FileType,
}

impl Validate for CreateDocumentRequest {
    fn validate(&self) -> Result<(), AppError> {
        require_text("name", &self.name, MAX_FIELD_LEN)?;
        check_opt_len("description", self.description.as_deref(), MAX_DESCRIPTION_LEN)
    }
}

/// Listing filters.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DocumentQuery {
    pub document_type: Option<DocumentType>,
    pub file_type: Option<FileType>,
    pub upload_status: Option<UploadStatus>,
}

impl DocumentQuery {
    fn matches(&self, doc: &DocumentRecord) -> bool {
        self.document_type.map_or(true, |t| doc.document_type == t)
            && self.file_type.map_or(true, |t| doc.file_type == t)
            && self.upload_status.map_or(true, |s| doc.upload_status == s)
    }
}

/// Storage notification.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StorageEvent {
    /// Object key of the uploaded file.
    pub key: String,
}

/// Editable document fields.
#[derive(Debug, Default)]
struct DocumentPatch {
    name: Option<String>,
    description: Option<Option<String>>,
    upload_status: Option<UploadStatus>,
}

impl DocumentPatch {
    fn parse(attrs: &serde_json::Map<String, Value>) -> Result<Self, AppError> {
        let patch = Self {
            name: attr(attrs, "name")?,
            description: attr(attrs, "description")?,
            upload_status: attr(attrs, "upload_status")?,
        };
        if let Some(name) = &patch.name {
            require_text("name", name, MAX_FIELD_LEN)?;
        }
        if let Some(Some(description)) = &patch.description {
            check_opt_len("description", Some(description), MAX_DESCRIPTION_LEN)?;
        }
        Ok(patch)
    }

    fn apply(&self, doc: &mut DocumentRecord, now: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(status) = self.upload_status {
            doc.upload_status = doc.upload_status.transition_to(status)?;
        }
        if let Some(name) = &self.name {
            doc.name = name.clone();
        }
        if let Some(description) = &self.description {
            doc.description = description.clone();
        }
        doc.updated_at = now;
        Ok(())
    }
}

// ─── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/shipments/{id}/documents",
            get(list_documents)
                .post(create_document)
                .fallback(method_not_allowed),
        )
        .route(
            "/shipments/{id}/documents/{doc_id}",
            get(get_document)
                .patch(update_document)
                .fallback(method_not_allowed),
        )
        .route(
            "/documents/events",
            post(storage_event).fallback(method_not_allowed),
        )
}

// ─── Handlers ────────────────────────────────────────────────────────

/// GET /shipments/{id}/documents — List documents.
#[utoipa::path(
    get,
    path = "/shipments/{id}/documents",
    params(("id" = Uuid, Path, description = "Shipment ID"), DocumentQuery),
    responses(
        (status = 200, description = "Documents", body = [DocumentAttributes]),
        (status = 403, description = "Permission denied", body = crate::error::ErrorBody),
    ),
    tag = "documents"
)]
async fn list_documents(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<ShipmentId>,
    Query(query): Query<DocumentQuery>,
) -> Result<JsonApi, AppError> {
    let shipment = shipment_or_404(&state, &id)?;
    access::require(&state, &ctx, &shipment, Endpoint::Documents, PermissionLevel::ReadOnly).await?;

    let mut documents = state
        .documents
        .filter(|d| d.shipment_id == id && query.matches(d));
    documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut resources = Vec::with_capacity(documents.len());
    for doc in &documents {
        resources.push(resource(&state, doc).await?);
    }
    Ok(JsonApi::many(resources))
}

/// POST /shipments/{id}/documents — Create a document and an upload URL.
#[utoipa::path(
    post,
    path = "/shipments/{id}/documents",
    params(("id" = Uuid, Path, description = "Shipment ID")),
    request_body = CreateDocumentRequest,
    responses(
        (status = 201, description = "Document created with its upload descriptor", body = DocumentAttributes),
        (status = 400, description = "Validation error", body = crate::error::ErrorBody),
        (status = 403, description = "Permission denied", body = crate::error::ErrorBody),
    ),
    tag = "documents"
)]
async fn create_document(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<ShipmentId>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<JsonApi, AppError> {
    let shipment = shipment_or_404(&state, &id)?;
    access::require(&state, &ctx, &shipment, Endpoint::Documents, PermissionLevel::ReadWrite).await?;
    let user = ctx.require_user()?;
    let req: CreateDocumentRequest = extract_validated_json(body)?;

    let now = Utc::now();
    let doc = new_document(&shipment, user.id.clone(), req, now);
    state.documents.insert(doc.id, doc.clone());
    state.persist(&doc).await?;
    record_history(&state, Some(user.id.to_string()), None, &doc).await?;
    tracing::info!(shipment_id = %id, document_id = %doc.id, file_type = ?doc.file_type, "document created");

    let mut attributes = DocumentAttributes::from_record(&doc);
    attributes.upload = Some(state.storage.presign_upload(
        Bucket::Documents,
        &doc.object_key,
        doc.file_type.content_type(),
        now,
    ));
    Ok(JsonApi::created(Resource::new(RESOURCE, doc.id, &attributes)?))
}

fn new_document(shipment: &ShipmentRecord, owner_id: UserId, req: CreateDocumentRequest, now: DateTime<Utc>) -> DocumentRecord {
    let id = DocumentId::new();
    let key = ObjectKey {
        storage_credentials_id: shipment.storage_credentials_id.clone(),
        shipper_wallet_id: shipment.shipper_wallet_id.clone(),
        vault_id: shipment.vault_id,
        document_id: id,
        extension: req.file_type.extension().to_string(),
    };
    DocumentRecord {
        id,
        shipment_id: shipment.id,
        owner_id,
        name: req.name,
        description: req.description,
        document_type: req.document_type,
        file_type: req.file_type,
        upload_status: UploadStatus::Pending,
        object_key: key.to_string(),
        created_at: now,
        updated_at: now,
    }
}

/// GET /shipments/{id}/documents/{doc_id} — One document.
#[utoipa::path(
    get,
    path = "/shipments/{id}/documents/{doc_id}",
    params(
        ("id" = Uuid, Path, description = "Shipment ID"),
        ("doc_id" = Uuid, Path, description = "Document ID"),
    ),
    responses(
        (status = 200, description = "Document", body = DocumentAttributes),
        (status = 403, description = "Permission denied", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "documents"
)]
async fn get_document(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((id, doc_id)): Path<(ShipmentId, DocumentId)>,
) -> Result<JsonApi, AppError> {
    let shipment = shipment_or_404(&state, &id)?;
    access::require(&state, &ctx, &shipment, Endpoint::Documents, PermissionLevel::ReadOnly).await?;
    let doc = document_or_404(&state, &id, &doc_id)?;
    Ok(JsonApi::one(resource(&state, &doc).await?))
}

/// PATCH /shipments/{id}/documents/{doc_id} — Rename or change upload status.
#[utoipa::path(
    patch,
    path = "/shipments/{id}/documents/{doc_id}",
    params(
        ("id" = Uuid, Path, description = "Shipment ID"),
        ("doc_id" = Uuid, Path, description = "Document ID"),
    ),
    responses(
        (status = 200, description = "Document updated", body = DocumentAttributes),
        (status = 400, description = "Invalid transition or field", body = crate::error::ErrorBody),
        (status = 403, description = "Permission denied", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "documents"
)]
async fn update_document(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((id, doc_id)): Path<(ShipmentId, DocumentId)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<JsonApi, AppError> {
    let shipment = shipment_or_404(&state, &id)?;
    access::require(&state, &ctx, &shipment, Endpoint::Documents, PermissionLevel::ReadWrite).await?;
    let current = document_or_404(&state, &id, &doc_id)?;
    let patch = DocumentPatch::parse(&extract_attributes(body)?)?;
    let before = snapshot(&current);

    let updated = state
        .documents
        .try_update(&doc_id, |doc| {
            patch.apply(doc, Utc::now())?;
            Ok::<_, AppError>(doc.clone())
        })
        .ok_or_else(|| AppError::not_found("Document"))??;

    state.persist(&updated).await?;
    record_history(&state, ctx.user_id().map(ToString::to_string), Some(&before), &updated).await?;
    tracing::info!(shipment_id = %id, document_id = %doc_id, upload_status = %updated.upload_status, "document updated");
    Ok(JsonApi::one(resource(&state, &updated).await?))
}

/// POST /documents/events — Storage upload notification.
#[utoipa::path(
    post,
    path = "/documents/events",
    request_body = StorageEvent,
    params(("x-storage-events-token" = String, Header, description = "Shared notification token")),
    responses(
        (status = 204, description = "Document marked COMPLETE"),
        (status = 400, description = "Malformed key or invalid transition", body = crate::error::ErrorBody),
        (status = 403, description = "Missing or wrong token", body = crate::error::ErrorBody),
        (status = 404, description = "No document for key", body = crate::error::ErrorBody),
    ),
    tag = "documents"
)]
async fn storage_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let presented = headers
        .get(EVENTS_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let authorized = state
        .events_token
        .as_deref()
        .is_some_and(|expected| events_token_matches(expected, presented));
    if !authorized {
        tracing::warn!("storage notification rejected: bad or missing token");
        return Err(AppError::Forbidden("Invalid storage notification token".to_string()));
    }

    let event: StorageEvent = extract_body(body)?;
    let key = ObjectKey::parse(&event.key).map_err(|e| AppError::field("key", e.to_string()))?;
    let current = state
        .documents
        .get(&key.document_id)
        .filter(|doc| doc.object_key == key.to_string())
        .ok_or_else(|| AppError::not_found("Document"))?;
    let before = snapshot(&current);

    let updated = state
        .documents
        .try_update(&key.document_id, |doc| {
            doc.upload_status = doc.upload_status.transition_to(UploadStatus::Complete)?;
            doc.updated_at = Utc::now();
            Ok::<_, AppError>(doc.clone())
        })
        .ok_or_else(|| AppError::not_found("Document"))??;

    state.persist(&updated).await?;
    record_history(&state, None, Some(&before), &updated).await?;
    tracing::info!(document_id = %updated.id, shipment_id = %updated.shipment_id, "document upload completed");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use transmission_core::{StorageCredentialsId, WalletId};
    use transmission_state::{ExceptionType, ShipmentLifecycle};
    use uuid::Uuid;

    use crate::records::ShipmentDetails;

    fn shipment() -> ShipmentRecord {
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

    fn document() -> DocumentRecord {
        new_document(
            &shipment(),
            UserId::new("owner").unwrap(),
            CreateDocumentRequest {
                name: "Bill of lading".into(),
                description: None,
                document_type: DocumentType::Bol,
                file_type: FileType::Pdf,
            },
            Utc::now(),
        )
    }

    #[test]
    fn object_key_maps_back_to_document() {
        let doc = document();
        let key = ObjectKey::parse(&doc.object_key).unwrap();
        assert_eq!(key.document_id, doc.id);
        assert_eq!(key.extension, "pdf");
        assert!(doc.object_key.starts_with("sc/shipper/"));
    }

    #[test]
    fn patch_moves_upload_status_forward_only() {
        let mut doc = document();
        let complete = DocumentPatch::parse(json!({"upload_status": "COMPLETE"}).as_object().unwrap()).unwrap();
        complete.apply(&mut doc, Utc::now()).unwrap();
        assert_eq!(doc.upload_status, UploadStatus::Complete);

        let failed = DocumentPatch::parse(json!({"upload_status": "FAILED"}).as_object().unwrap()).unwrap();
        let before = doc.clone();
        assert!(failed.apply(&mut doc, Utc::now()).is_err());
        assert_eq!(doc, before);
    }

    #[test]
    fn patch_edits_name_and_clears_description() {
        let mut doc = document();
        doc.description = Some("old".into());
        let patch = DocumentPatch::parse(json!({"name": "BOL v2", "description": null}).as_object().unwrap()).unwrap();
        patch.apply(&mut doc, Utc::now()).unwrap();
        assert_eq!(doc.name, "BOL v2");
        assert!(doc.description.is_none());
    }

    #[test]
    fn query_filters_combine() {
        let doc = document();
        assert!(DocumentQuery::default().matches(&doc));
        let q = DocumentQuery {
            document_type: Some(DocumentType::Bol),
            file_type: Some(FileType::Png),
            upload_status: None,
        };
        assert!(!q.matches(&doc));
    }
}

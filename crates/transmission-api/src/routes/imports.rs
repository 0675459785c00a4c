//! # Shipment Imports
//!
//! A bulk import is a spreadsheet uploaded to object storage and processed
//! out of band. This service records the file, hands out the upload URL and
//! tracks the upload and processing status. Imports belong to their creator
//! and the creator's organization.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use transmission_core::{ImportId, StorageCredentialsId, UserId, WalletId};
use transmission_state::{ProcessingStatus, UploadStatus};
use utoipa::ToSchema;

use crate::auth::{AuthenticatedUser, RequestContext};
use crate::error::AppError;
use crate::extractors::{check_opt_len, extract_validated_json, require_text, Validate};
use crate::jsonapi::{extract_attributes, JsonApi, Resource};
use crate::records::{ImportFileType, ImportRecord, MAX_FIELD_LEN};
use crate::routes::{attr, method_not_allowed};
use crate::state::AppState;
use crate::storage::{import_key, Bucket, UploadDescriptor};

pub const RESOURCE: &str = "ShipmentImport";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ImportAttributes {
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub file_type: ImportFileType,
    pub storage_credentials_id: StorageCredentialsId,
    pub shipper_wallet_id: WalletId,
    pub carrier_wallet_id: WalletId,
    pub upload_status: UploadStatus,
    pub processing_status: ProcessingStatus,
    #[schema(value_type = Option<Object>)]
    pub report: Option<Value>,
    /// Presigned POST for the file. Returned on creation only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadDescriptor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportAttributes {
    fn from_record(record: &ImportRecord) -> Self {
        Self {
            owner_id: record.owner_id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            file_type: record.file_type,
            storage_credentials_id: record.storage_credentials_id.clone(),
            shipper_wallet_id: record.shipper_wallet_id.clone(),
            carrier_wallet_id: record.carrier_wallet_id.clone(),
            upload_status: record.upload_status,
            processing_status: record.processing_status,
            report: record.report.clone(),
            upload: None,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

fn resource(record: &ImportRecord) -> Result<Resource, AppError> {
    Resource::new(RESOURCE, record.id, &ImportAttributes::from_record(record))
}

fn is_visible_to(record: &ImportRecord, user: &AuthenticatedUser) -> bool {
    record.owner_id == user.id
        || matches!(
            (&record.organization_id, &user.organization_id),
            (Some(a), Some(b)) if a == b
        )
}

fn import_or_404(state: &AppState, user: &AuthenticatedUser, id: &ImportId) -> Result<ImportRecord, AppError> {
    state
        .imports
        .get(id)
        .filter(|record| is_visible_to(record, user))
        .ok_or_else(|| AppError::not_found("ShipmentImport"))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateImportRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub file_type: ImportFileType,
    pub storage_credentials_id: StorageCredentialsId,
    pub shipper_wallet_id: WalletId,
    pub carrier_wallet_id: WalletId,
}

impl Validate for CreateImportRequest {
    fn validate(&self) -> Result<(), AppError> {
        require_text("name", &self.name, MAX_FIELD_LEN)?;
        check_opt_len("description", self.description.as_deref(), 1000)
    }
}

/// Editable import fields.
#[derive(Debug, Default)]
struct ImportPatch {
    name: Option<String>,
    description: Option<Option<String>>,
    upload_status: Option<UploadStatus>,
    processing_status: Option<ProcessingStatus>,
    report: Option<Value>,
}

impl ImportPatch {
    fn parse(attrs: &Map<String, Value>) -> Result<Self, AppError> {
        let patch = Self {
            name: attr(attrs, "name")?,
            description: attr(attrs, "description")?,
            upload_status: attr(attrs, "upload_status")?,
            processing_status: attr(attrs, "processing_status")?,
            report: attrs.get("report").cloned(),
        };
        if let Some(name) = &patch.name {
            require_text("name", name, MAX_FIELD_LEN)?;
        }
        if let Some(Some(description)) = &patch.description {
            check_opt_len("description", Some(description), 1000)?;
        }
        Ok(patch)
    }

    /// Upload status is applied first so that processing can advance in
    /// the same request that completes the upload.
    fn apply(&self, record: &mut ImportRecord, now: DateTime<Utc>) -> Result<(), AppError> {
        let upload = match self.upload_status {
            Some(status) => record.upload_status.transition_to(status)?,
            None => record.upload_status,
        };
        let processing = match self.processing_status {
            Some(status) => record.processing_status.transition_to(status, upload)?,
            None => record.processing_status,
        };

        record.upload_status = upload;
        record.processing_status = processing;
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(report) = &self.report {
            record.report = (!report.is_null()).then(|| report.clone());
        }
        record.updated_at = now;
        Ok(())
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/imports",
            get(list_imports)
                .post(create_import)
                .fallback(method_not_allowed),
        )
        .route(
            "/imports/{id}",
            get(get_import)
                .patch(update_import)
                .fallback(method_not_allowed),
        )
}

/// GET /imports — The caller's imports.
#[utoipa::path(
    get,
    path = "/imports",
    responses(
        (status = 200, description = "Imports, newest first", body = [ImportAttributes]),
        (status = 403, description = "Not authenticated", body = crate::error::ErrorBody),
    ),
    tag = "imports"
)]
async fn list_imports(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<JsonApi, AppError> {
    let user = ctx.require_user()?;
    let mut imports = state.imports.filter(|record| is_visible_to(record, user));
    imports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let resources = imports.iter().map(resource).collect::<Result<Vec<_>, _>>()?;
    Ok(JsonApi::many(resources))
}

/// POST /imports — Register an import file and get its upload URL.
#[utoipa::path(
    post,
    path = "/imports",
    request_body = CreateImportRequest,
    responses(
        (status = 201, description = "Import created with its upload descriptor", body = ImportAttributes),
        (status = 400, description = "Validation error", body = crate::error::ErrorBody),
        (status = 503, description = "Identity service unavailable", body = crate::error::ErrorBody),
    ),
    tag = "imports"
)]
async fn create_import(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<JsonApi, AppError> {
    let user = ctx.require_user()?.clone();
    let req: CreateImportRequest = extract_validated_json(body)?;

    let identity = state.identity()?;
    let token = ctx.token.as_deref().unwrap_or_default();
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
    for (field, wallet) in [
        ("shipper_wallet_id", &req.shipper_wallet_id),
        ("carrier_wallet_id", &req.carrier_wallet_id),
    ] {
        if !identity.wallet_is_active(token, wallet).await? {
            return Err(AppError::field(
                field,
                format!("User does not have access to wallet {wallet}"),
            ));
        }
    }

    let now = Utc::now();
    let id = ImportId::new();
    let record = ImportRecord {
        id,
        owner_id: user.id.clone(),
        organization_id: user.organization_id.clone(),
        name: req.name,
        description: req.description,
        file_type: req.file_type,
        storage_credentials_id: req.storage_credentials_id,
        shipper_wallet_id: req.shipper_wallet_id,
        carrier_wallet_id: req.carrier_wallet_id,
        upload_status: UploadStatus::Pending,
        processing_status: ProcessingStatus::Pending,
        report: None,
        object_key: import_key(&user.id, &id, req.file_type.extension()),
        created_at: now,
        updated_at: now,
    };
    state.imports.insert(record.id, record.clone());
    state.persist(&record).await?;
    tracing::info!(import_id = %record.id, owner_id = %record.owner_id, "shipment import created");

    let mut attributes = ImportAttributes::from_record(&record);
    attributes.upload = Some(state.storage.presign_upload(
        Bucket::Imports,
        &record.object_key,
        record.file_type.content_type(),
        now,
    ));
    Ok(JsonApi::created(Resource::new(RESOURCE, record.id, &attributes)?))
}

/// GET /imports/{id} — One import.
#[utoipa::path(
    get,
    path = "/imports/{id}",
    params(("id" = Uuid, Path, description = "Import ID")),
    responses(
        (status = 200, description = "Import", body = ImportAttributes),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "imports"
)]
async fn get_import(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<ImportId>,
) -> Result<JsonApi, AppError> {
    let user = ctx.require_user()?;
    Ok(JsonApi::one(resource(&import_or_404(&state, user, &id)?)?))
}

/// PATCH /imports/{id} — Update upload or processing status.
#[utoipa::path(
    patch,
    path = "/imports/{id}",
    params(("id" = Uuid, Path, description = "Import ID")),
    responses(
        (status = 200, description = "Import updated", body = ImportAttributes),
        (status = 400, description = "Invalid transition", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "imports"
)]
async fn update_import(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<ImportId>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<JsonApi, AppError> {
    let user = ctx.require_user()?;
    import_or_404(&state, user, &id)?;
    let patch = ImportPatch::parse(&extract_attributes(body)?)?;

    let updated = state
        .imports
        .try_update(&id, |record| {
            patch.apply(record, Utc::now())?;
            Ok::<_, AppError>(record.clone())
        })
        .ok_or_else(|| AppError::not_found("ShipmentImport"))??;

    state.persist(&updated).await?;
    tracing::info!(
        import_id = %id,
        upload_status = %updated.upload_status,
        processing_status = %updated.processing_status,
        "shipment import updated"
    );
    Ok(JsonApi::one(resource(&updated)?))
}

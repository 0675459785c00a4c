//! # API Route Modules
//!
//! - `shipments` — shipment CRUD, lifecycle actions and audit history.
//! - `tags`, `notes` — shipment annotations.
//! - `permission_links` — anonymous read-only links.
//! - `access_requests` — scoped access requests and their approval.
//! - `documents` — shipment documents and storage notifications.
//! - `imports` — bulk shipment import files.
//! - `devices` — signed device ingestion and the tracking/telemetry reads.

pub mod access_requests;
pub mod devices;
pub mod documents;
pub mod imports;
pub mod notes;
pub mod permission_links;
pub mod shipments;
pub mod tags;

use axum::http::Method;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::AppError;

/// Fallback for methods a resource does not support.
pub(crate) async fn method_not_allowed(method: Method) -> AppError {
    AppError::MethodNotAllowed(method.to_string())
}

/// Decode the attribute `key` when the request carries it.
pub(crate) fn attr<T: DeserializeOwned>(
    attrs: &Map<String, Value>,
    key: &str,
) -> Result<Option<T>, AppError> {
    attrs
        .get(key)
        .map(|value| {
            serde_json::from_value(value.clone())
                .map_err(|e| AppError::field(key, format!("invalid {key}: {e}")))
        })
        .transpose()
}

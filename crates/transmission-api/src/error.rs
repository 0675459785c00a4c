//! # API Error Types
//!
//! [`AppError`] implements `IntoResponse` and renders a JSON:API error
//! document. Every authentication and authorization failure is a 403; there
//! is no 401 on this surface. Internal and upstream failures return a generic
//! message; the detail is logged only.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::jsonapi::JSON_API_MEDIA_TYPE;

/// JSON:API error document.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub errors: Vec<ErrorDetail>,
}

/// One JSON:API error object.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// HTTP status as a string.
    pub status: String,
    /// Machine-readable code (e.g. "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable explanation.
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
}

/// Where in the request document the error originates.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorSource {
    pub pointer: String,
}

/// Application-level error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or invalid credentials (403).
    #[error("{0}")]
    Authentication(String),

    /// Caller lacks derived access (403).
    #[error("{0}")]
    Forbidden(String),

    /// Field-level constraint violation (400).
    #[error("{message}")]
    Validation {
        /// JSON pointer into the request document, when one field is at fault.
        pointer: Option<String>,
        message: String,
    },

    /// Business rule violation spanning records (400).
    #[error("{0}")]
    Conflict(String),

    /// Resource not found (404).
    #[error("{0}")]
    NotFound(String),

    /// Method not supported on this resource (405).
    #[error("Method \"{0}\" not allowed.")]
    MethodNotAllowed(String),

    /// A collaborator failed or is not configured (503). Detail is logged only.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Internal server error (500). Detail is logged only.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Message returned when derived access is insufficient.
pub const PERMISSION_DENIED: &str = "You do not have permission to perform this action.";

impl AppError {
    /// Validation error pointing at a request attribute.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            pointer: Some(format!("/data/attributes/{field}")),
            message: message.into(),
        }
    }

    /// Validation error without a pointer.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            pointer: None,
            message: message.into(),
        }
    }

    pub fn forbidden() -> Self {
        Self::Forbidden(PERMISSION_DENIED.to_string())
    }

    pub fn not_found(resource: &str) -> Self {
        Self::NotFound(format!("{resource} not found."))
    }

    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Authentication(_) => (StatusCode::FORBIDDEN, "NOT_AUTHENTICATED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "PERMISSION_DENIED"),
            Self::Validation { .. } => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::Conflict(_) => (StatusCode::BAD_REQUEST, "INTEGRITY_CONFLICT"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::MethodNotAllowed(_) => (StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED"),
            Self::Upstream(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let detail = match &self {
            Self::Internal(_) => {
                tracing::error!(error = %self, "internal server error");
                "An internal error occurred".to_string()
            }
            Self::Upstream(_) => {
                tracing::warn!(error = %self, "upstream collaborator failure");
                "Service unavailable".to_string()
            }
            Self::Authentication(_) => {
                tracing::warn!(error = %self, "authentication failure");
                self.to_string()
            }
            other => other.to_string(),
        };

        let source = match &self {
            Self::Validation {
                pointer: Some(pointer),
                ..
            } => Some(ErrorSource {
                pointer: pointer.clone(),
            }),
            _ => None,
        };

        let body = ErrorBody {
            errors: vec![ErrorDetail {
                status: status.as_u16().to_string(),
                code: code.to_string(),
                detail,
                source,
            }],
        };

        let bytes = match serde_json::to_vec(&body) {
            Ok(bytes) => bytes,
            Err(_) => return status.into_response(),
        };
        (status, [(header::CONTENT_TYPE, JSON_API_MEDIA_TYPE)], bytes).into_response()
    }
}

impl From<transmission_core::ValidationError> for AppError {
    fn from(err: transmission_core::ValidationError) -> Self {
        Self::field(err.field(), err.to_string())
    }
}

impl From<transmission_state::ShipmentError> for AppError {
    fn from(err: transmission_state::ShipmentError) -> Self {
        if err.is_permission_denied() {
            return Self::Forbidden(err.to_string());
        }
        match err.field() {
            Some(field) => Self::field(field, err.to_string()),
            None => Self::invalid(err.to_string()),
        }
    }
}

impl From<transmission_state::AccessRequestError> for AppError {
    fn from(err: transmission_state::AccessRequestError) -> Self {
        if err.is_forbidden() {
            return Self::Forbidden(err.to_string());
        }
        match err.field() {
            Some(field) => Self::field(field, err.to_string()),
            None => Self::invalid(err.to_string()),
        }
    }
}

impl From<transmission_state::UploadError> for AppError {
    fn from(err: transmission_state::UploadError) -> Self {
        Self::field(err.field(), err.to_string())
    }
}

impl From<transmission_profiles::ProfilesError> for AppError {
    fn from(err: transmission_profiles::ProfilesError) -> Self {
        Self::Upstream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn response_parts(err: AppError) -> (StatusCode, String, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        (status, content_type, body)
    }

    #[test]
    fn status_mapping() {
        let cases = [
            (AppError::Authentication("x".into()), StatusCode::FORBIDDEN),
            (AppError::forbidden(), StatusCode::FORBIDDEN),
            (AppError::invalid("x"), StatusCode::BAD_REQUEST),
            (AppError::Conflict("x".into()), StatusCode::BAD_REQUEST),
            (AppError::not_found("Shipment"), StatusCode::NOT_FOUND),
            (AppError::MethodNotAllowed("PUT".into()), StatusCode::METHOD_NOT_ALLOWED),
            (AppError::Upstream("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status_and_code().0, expected, "{err:?}");
        }
    }

    #[tokio::test]
    async fn validation_carries_pointer() {
        let (status, content_type, body) =
            response_parts(AppError::field("shipper_wallet_id", "bad wallet")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(content_type, JSON_API_MEDIA_TYPE);
        let error = &body.errors[0];
        assert_eq!(error.status, "400");
        assert_eq!(error.detail, "bad wallet");
        assert_eq!(
            error.source.as_ref().unwrap().pointer,
            "/data/attributes/shipper_wallet_id"
        );
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let (status, _, body) = response_parts(AppError::Internal("db password wrong".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.errors[0].detail, "An internal error occurred");
    }

    #[tokio::test]
    async fn upstream_is_generic_service_unavailable() {
        let (status, _, body) =
            response_parts(AppError::Upstream("profiles returned 502".into())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.errors[0].detail, "Service unavailable");
        assert!(body.errors[0].source.is_none());
    }

    #[test]
    fn shipment_tag_errors_are_permission_denied() {
        let err = AppError::from(transmission_state::ShipmentError::AssetTagMismatch);
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn out_of_order_action_is_validation() {
        let err = AppError::from(transmission_state::ShipmentError::ActionNotAvailable {
            action: transmission_state::ShipmentAction::PickUp,
            state: transmission_state::ShipmentState::InTransit,
        });
        match err {
            AppError::Validation { pointer, message } => {
                assert_eq!(pointer.as_deref(), Some("/data/attributes/action_type"));
                assert_eq!(
                    message,
                    "Action PICK_UP not available while Shipment is in state IN_TRANSIT"
                );
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn access_request_not_permitted_is_forbidden() {
        let err = AppError::from(transmission_state::AccessRequestError::NotPermitted("no"));
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}

//! # Validated Request Bodies
//!
//! Request DTOs implement [`Validate`]; handlers call
//! [`extract_validated_json`] to unwrap the JSON:API document, deserialize
//! and validate in one step.

use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AppError;
use crate::jsonapi::extract_body;

/// Field-level validation beyond what deserialization enforces.
pub trait Validate {
    fn validate(&self) -> Result<(), AppError>;
}

/// Deserialize and validate a request body.
pub fn extract_validated_json<T: DeserializeOwned + Validate>(
    body: Result<Json<Value>, JsonRejection>,
) -> Result<T, AppError> {
    let value: T = extract_body(body)?;
    value.validate()?;
    Ok(value)
}

/// Non-empty after trimming and at most `max` characters.
pub fn require_text(field: &str, value: &str, max: usize) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::field(field, format!("{field} must not be empty")));
    }
    check_len(field, value, max)
}

/// At most `max` characters.
pub fn check_len(field: &str, value: &str, max: usize) -> Result<(), AppError> {
    let len = value.chars().count();
    if len > max {
        return Err(AppError::field(
            field,
            format!("{field} must not exceed {max} characters (got {len})"),
        ));
    }
    Ok(())
}

/// [`check_len`] for optional attributes.
pub fn check_opt_len(field: &str, value: Option<&str>, max: usize) -> Result<(), AppError> {
    value.map_or(Ok(()), |v| check_len(field, v, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Note {
        message: String,
    }

    impl Validate for Note {
        fn validate(&self) -> Result<(), AppError> {
            require_text("message", &self.message, 5)
        }
    }

    #[test]
    fn validation_runs_after_deserialization() {
        let ok: Note =
            extract_validated_json(Ok(Json(serde_json::json!({"message": "hi"})))).unwrap();
        assert_eq!(ok.message, "hi");

        let err =
            extract_validated_json::<Note>(Ok(Json(serde_json::json!({"message": "  "}))))
                .unwrap_err();
        assert_eq!(err.to_string(), "message must not be empty");

        let err =
            extract_validated_json::<Note>(Ok(Json(serde_json::json!({"message": "too long"}))))
                .unwrap_err();
        match err {
            AppError::Validation { pointer, .. } => {
                assert_eq!(pointer.as_deref(), Some("/data/attributes/message"))
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn length_counts_characters() {
        assert!(check_len("f", "ééé", 3).is_ok());
        assert!(check_len("f", "éééé", 3).is_err());
        assert!(check_opt_len("f", None, 0).is_ok());
    }
}

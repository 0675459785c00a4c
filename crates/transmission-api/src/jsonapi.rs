//! # JSON:API Documents
//!
//! Responses use `{"data": {"type", "id", "attributes"}}` with the
//! `application/vnd.api+json` media type. Request bodies are accepted either
//! as a JSON:API document or as a bare attributes object.

use axum::extract::rejection::JsonRejection;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;

pub const JSON_API_MEDIA_TYPE: &str = "application/vnd.api+json";

/// One resource object.
#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub attributes: Value,
}

impl Resource {
    /// Build a resource from any serializable attributes. `id` is removed
    /// from the attributes since it is carried at the top level.
    pub fn new(kind: &'static str, id: impl ToString, attributes: &impl Serialize) -> Result<Self, AppError> {
        let mut attributes = serde_json::to_value(attributes)
            .map_err(|e| AppError::Internal(format!("serialize {kind}: {e}")))?;
        if let Value::Object(map) = &mut attributes {
            map.remove("id");
        }
        Ok(Self {
            kind,
            id: id.to_string(),
            attributes,
        })
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Data {
    One(Resource),
    Many(Vec<Resource>),
}

#[derive(Serialize)]
struct Document {
    data: Data,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<Value>,
}

/// A JSON:API response.
pub struct JsonApi {
    status: StatusCode,
    document: Document,
}

impl JsonApi {
    pub fn one(resource: Resource) -> Self {
        Self {
            status: StatusCode::OK,
            document: Document {
                data: Data::One(resource),
                meta: None,
            },
        }
    }

    pub fn many(resources: Vec<Resource>) -> Self {
        let count = resources.len();
        Self {
            status: StatusCode::OK,
            document: Document {
                data: Data::Many(resources),
                meta: Some(serde_json::json!({ "count": count })),
            },
        }
    }

    pub fn created(resource: Resource) -> Self {
        Self::one(resource).with_status(StatusCode::CREATED)
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.document.meta = Some(meta);
        self
    }
}

impl IntoResponse for JsonApi {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.document) {
            Ok(bytes) => (
                self.status,
                [(header::CONTENT_TYPE, JSON_API_MEDIA_TYPE)],
                bytes,
            )
                .into_response(),
            Err(e) => AppError::Internal(format!("serialize response: {e}")).into_response(),
        }
    }
}

/// Extract a request body as `T`, unwrapping `data.attributes` when the body
/// is a JSON:API document.
pub fn extract_body<T: DeserializeOwned>(body: Result<Json<Value>, JsonRejection>) -> Result<T, AppError> {
    let Json(value) = body.map_err(|err| AppError::invalid(err.body_text()))?;
    let attributes = unwrap_document(value);
    serde_json::from_value(attributes).map_err(|e| AppError::Validation {
        pointer: Some("/data/attributes".to_string()),
        message: e.to_string(),
    })
}

/// Raw attributes object of a request body. Used by PATCH handlers that must
/// know which keys were present.
pub fn extract_attributes(body: Result<Json<Value>, JsonRejection>) -> Result<serde_json::Map<String, Value>, AppError> {
    let Json(value) = body.map_err(|err| AppError::invalid(err.body_text()))?;
    match unwrap_document(value) {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::Validation {
            pointer: Some("/data/attributes".to_string()),
            message: "attributes must be an object".to_string(),
        }),
    }
}

fn unwrap_document(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
            match map.remove("data") {
                Some(Value::Object(mut data)) => data.remove("attributes").unwrap_or(Value::Object(data)),
                _ => Value::Object(map),
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Attrs {
        name: String,
    }

    #[test]
    fn accepts_document_and_bare_bodies() {
        let doc = serde_json::json!({"data": {"type": "Thing", "attributes": {"name": "a"}}});
        let bare = serde_json::json!({"name": "b"});
        let a: Attrs = extract_body(Ok(Json(doc))).unwrap();
        let b: Attrs = extract_body(Ok(Json(bare))).unwrap();
        assert_eq!(a.name, "a");
        assert_eq!(b.name, "b");
    }

    #[test]
    fn deserialization_failure_points_at_attributes() {
        let err = extract_body::<Attrs>(Ok(Json(serde_json::json!({"nom": 1})))).unwrap_err();
        match err {
            AppError::Validation { pointer, .. } => {
                assert_eq!(pointer.as_deref(), Some("/data/attributes"))
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn resource_strips_id_from_attributes() {
        let r = Resource::new("Thing", 7, &serde_json::json!({"id": 7, "name": "x"})).unwrap();
        assert_eq!(r.id, "7");
        assert!(r.attributes.get("id").is_none());
        assert_eq!(r.attributes["name"], "x");
    }

    #[tokio::test]
    async fn response_media_type_and_shape() {
        let r = Resource::new("Thing", "abc", &serde_json::json!({"name": "x"})).unwrap();
        let response = JsonApi::created(r).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            JSON_API_MEDIA_TYPE
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["data"]["type"], "Thing");
        assert_eq!(value["data"]["id"], "abc");
    }

    #[test]
    fn collection_meta_count() {
        let doc = JsonApi::many(vec![]);
        let value = serde_json::to_value(&doc.document).unwrap();
        assert_eq!(value["meta"]["count"], 0);
        assert!(value["data"].as_array().unwrap().is_empty());
    }
}

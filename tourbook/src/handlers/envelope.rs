//! Uniform success envelope
//!
//! Every handler answers `{status: "success", results?, token?, data}`.
//! Lists carry their count in `results`; records sit under `data.data`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::store::Document;

/// Success response body with its status code
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(skip)]
    code: StatusCode,

    /// Always `success`
    pub status: &'static str,

    /// Number of records in a list response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,

    /// Session token for authentication responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Informational message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    /// Bare `{status: "success"}`
    pub fn success() -> Self {
        Self {
            code: StatusCode::OK,
            status: "success",
            results: None,
            token: None,
            message: None,
            data: None,
        }
    }

    /// `data: {key: value}`
    pub fn data(key: &str, value: impl Into<Value>) -> Self {
        let mut data = Map::new();
        data.insert(key.to_string(), value.into());
        Self {
            data: Some(Value::Object(data)),
            ..Self::success()
        }
    }

    /// One record under `data.data`
    pub fn item(doc: Document) -> Self {
        Self::data("data", Value::Object(doc))
    }

    /// Records under `data.data` with their count
    pub fn list(docs: Vec<Document>) -> Self {
        let results = docs.len();
        let items: Vec<Value> = docs.into_iter().map(Value::Object).collect();
        Self {
            results: Some(results),
            ..Self::data("data", items)
        }
    }

    /// Override the status code
    #[must_use]
    pub fn with_code(mut self, code: StatusCode) -> Self {
        self.code = code;
        self
    }

    /// Attach a session token
    #[must_use]
    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    /// Attach a message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Response status code
    pub fn code(&self) -> StatusCode {
        self.code
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.code, Json(self)).into_response()
    }
}

/// `204 No Content` with an empty body
pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_envelope_shape() {
        let docs = vec![json!({"name": "a"}), json!({"name": "b"})]
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect();
        let body = serde_json::to_value(Envelope::list(docs)).unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["results"], 2);
        assert_eq!(body["data"]["data"][1]["name"], "b");
        assert!(body.get("token").is_none());
    }

    #[test]
    fn test_created_code_not_serialized() {
        let envelope = Envelope::data("user", json!({"name": "a"}))
            .with_code(StatusCode::CREATED)
            .with_token("t".to_string());
        assert_eq!(envelope.code(), StatusCode::CREATED);
        let body = serde_json::to_value(&envelope).unwrap();
        assert_eq!(body, json!({"status": "success", "token": "t", "data": {"user": {"name": "a"}}}));
    }
}

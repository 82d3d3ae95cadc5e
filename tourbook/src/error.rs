//! Error types and HTTP response conversion
//!
//! Every handler returns [`Result`]; failures funnel into [`Error::normalize`],
//! which separates operational errors (expected, with a user-facing status and
//! message) from programming errors (logged, surfaced generically).
//!
//! The response body is always safe for production. In development the
//! [`render_errors`] middleware rewrites error bodies to add debug detail.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::Environment;
use crate::model::ValidationErrors;
use crate::store::StoreError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Message returned for programming errors in production
pub const GENERIC_MESSAGE: &str = "Something went very wrong!";

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Document store error
    #[error("{0}")]
    Store(StoreError),

    /// A value could not be converted to the field's schema type
    #[error("Cast failed for path `{path}` with value {value}")]
    Cast {
        /// Field path
        path: String,
        /// Offending value as received
        value: String,
    },

    /// Schema validation failed
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// JWT encoding or decoding error
    #[error("JWT error: {0}")]
    Jwt(Box<jsonwebtoken::errors::Error>),

    /// Password hashing error
    #[error("Password hashing error: {0}")]
    Password(String),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(Box<axum::http::Error>),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Authorization error
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Expected failure with an explicit status
    #[error("{message}")]
    Operational {
        /// Response status
        status: StatusCode,
        /// User-facing message
        message: String,
    },

    /// External service error (502)
    #[error("External service error: {0}")]
    External(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// An error reduced to what the client sees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Response status
    pub status: StatusCode,
    /// User-facing message
    pub message: String,
    /// Whether the error is expected (safe to show verbatim)
    pub operational: bool,
}

impl Normalized {
    fn operational(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            operational: true,
        }
    }

    fn programming() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: GENERIC_MESSAGE.to_string(),
            operational: false,
        }
    }
}

impl Error {
    /// Operational error with an explicit status
    pub fn operational(status: StatusCode, message: impl Into<String>) -> Self {
        Error::Operational {
            status,
            message: message.into(),
        }
    }

    /// Map the error to a status and user-facing message
    pub fn normalize(&self) -> Normalized {
        match self {
            Error::Cast { path, value } => {
                Normalized::operational(StatusCode::BAD_REQUEST, format!("Invalid {}: {}.", path, value))
            }
            Error::Store(e) if e.is_duplicate_key() => Normalized::operational(
                StatusCode::BAD_REQUEST,
                format!(
                    "Duplicate field value: {}. Please use another value!",
                    e.key_value.as_deref().unwrap_or("unknown")
                ),
            ),
            Error::Validation(errors) => Normalized::operational(
                StatusCode::BAD_REQUEST,
                format!("Invalid input data. {}", errors),
            ),
            Error::Jwt(e) => match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Normalized::operational(
                    StatusCode::UNAUTHORIZED,
                    "Your token has expired! Please log in again.",
                ),
                _ => Normalized::operational(
                    StatusCode::UNAUTHORIZED,
                    "Invalid token. Please log in again!",
                ),
            },
            Error::Unauthorized(msg) => Normalized::operational(StatusCode::UNAUTHORIZED, msg.clone()),
            Error::Forbidden(msg) => Normalized::operational(StatusCode::FORBIDDEN, msg.clone()),
            Error::NotFound(msg) => Normalized::operational(StatusCode::NOT_FOUND, msg.clone()),
            Error::BadRequest(msg) => Normalized::operational(StatusCode::BAD_REQUEST, msg.clone()),
            Error::RateLimitExceeded => Normalized::operational(
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests from this IP, please try again in an hour!",
            ),
            Error::Operational { status, message } => Normalized::operational(*status, message.clone()),
            Error::External(_) => {
                Normalized::operational(StatusCode::BAD_GATEWAY, "External service unavailable")
            }
            Error::Config(_)
            | Error::Store(_)
            | Error::Password(_)
            | Error::Http(_)
            | Error::Io(_)
            | Error::Internal(_) => Normalized::programming(),
        }
    }
}

/// `fail` for client errors, `error` otherwise
pub fn status_word(status: StatusCode) -> &'static str {
    if status.is_client_error() {
        "fail"
    } else {
        "error"
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// `fail` or `error`
    pub status: String,

    /// User-facing message
    pub message: String,

    /// Debug representation (development only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Error chain (development only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorResponse {
    /// Create a production-safe error response
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: status_word(status).to_string(),
            message: message.into(),
            error: None,
            stack: None,
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Detail attached to error responses for [`render_errors`]
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    /// `Debug` rendering of the error
    pub debug: String,
    /// Full error message, including for programming errors
    pub message: String,
    /// Source chain, outermost first
    pub stack: String,
}

impl From<&Error> for ErrorDetail {
    fn from(err: &Error) -> Self {
        let mut stack = vec![err.to_string()];
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            stack.push(cause.to_string());
            source = cause.source();
        }
        Self {
            debug: format!("{:?}", err),
            message: err.to_string(),
            stack: stack.join("\n    caused by: "),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let normalized = self.normalize();

        if normalized.operational {
            tracing::debug!(status = normalized.status.as_u16(), "Operational error: {}", self);
        } else {
            tracing::error!(error = ?self, "Unhandled error: {}", self);
        }

        let detail = ErrorDetail::from(&self);
        let body = ErrorResponse::new(normalized.status, normalized.message);
        let mut response = (normalized.status, Json(body)).into_response();
        response.extensions_mut().insert(detail);
        response
    }
}

/// Middleware that adds debug detail to error bodies outside production
pub async fn render_errors(
    State(environment): State<Environment>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if environment.is_production() {
        return response;
    }
    let Some(detail) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };

    let status = response.status();
    let body = ErrorResponse {
        status: status_word(status).to_string(),
        message: detail.message.clone(),
        error: Some(detail.debug),
        stack: Some(detail.stack),
    };
    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    match serde_json::to_vec(&body) {
        Ok(bytes) => Response::from_parts(parts, Body::from(bytes)),
        Err(e) => {
            tracing::error!("Failed to render error body: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Store(err)
    }
}

impl From<ValidationErrors> for Error {
    fn from(err: ValidationErrors) -> Self {
        Error::Validation(err)
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Error::Jwt(Box::new(err))
    }
}

impl From<axum::http::Error> for Error {
    fn from(err: axum::http::Error) -> Self {
        Error::Http(Box::new(err))
    }
}

impl From<argon2::password_hash::Error> for Error {
    fn from(err: argon2::password_hash::Error) -> Self {
        Error::Password(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldError;
    use crate::store::StoreError;
    use axum::{middleware, routing::get, Router};
    use tower::ServiceExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_cast_error_message() {
        let err = Error::Cast {
            path: "_id".into(),
            value: "wwwwww".into(),
        };
        let n = err.normalize();
        assert_eq!(n.status, StatusCode::BAD_REQUEST);
        assert_eq!(n.message, "Invalid _id: wwwwww.");
    }

    #[test]
    fn test_duplicate_key_message() {
        let err: Error =
            StoreError::duplicate_key("tours", &["name".to_string()], "\"The Sea Explorer\"").into();
        let n = err.normalize();
        assert_eq!(n.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            n.message,
            "Duplicate field value: \"The Sea Explorer\". Please use another value!"
        );
    }

    #[test]
    fn test_validation_message_names_fields() {
        let err: Error = ValidationErrors::from(vec![
            FieldError::new("name", "A tour must have a name"),
            FieldError::new("price", "A tour must have a price"),
        ])
        .into();
        let n = err.normalize();
        assert_eq!(n.status, StatusCode::BAD_REQUEST);
        assert!(n.message.starts_with("Invalid input data."));
        assert!(n.message.contains("name: A tour must have a name"));
        assert!(n.message.contains("price: A tour must have a price"));
    }

    #[test]
    fn test_programming_errors_are_generic() {
        let n = Error::Internal("index out of bounds".into()).normalize();
        assert_eq!(n.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(n.message, GENERIC_MESSAGE);
        assert!(!n.operational);
        assert_eq!(status_word(n.status), "error");
        assert_eq!(status_word(StatusCode::NOT_FOUND), "fail");
    }

    #[tokio::test]
    async fn test_production_body_is_minimal() {
        let response = Error::Internal("secret detail".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], GENERIC_MESSAGE);
        assert!(body.get("stack").is_none());
        assert!(!body.to_string().contains("secret detail"));
    }

    #[tokio::test]
    async fn test_development_body_is_verbose() {
        async fn fail() -> Result<&'static str> {
            Err(Error::Internal("secret detail".into()))
        }
        let app = Router::new()
            .route("/", get(fail))
            .layer(middleware::from_fn_with_state(Environment::Development, render_errors));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("secret detail"));
        assert!(body["stack"].is_string());
        assert!(body["error"].is_string());
    }
}

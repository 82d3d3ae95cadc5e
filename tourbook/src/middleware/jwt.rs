//! Authentication middleware
//!
//! [`protect`] verifies the session token, loads the user and stores a
//! [`CurrentUser`] in the request extensions for handlers downstream.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use super::token::extract_token;
use crate::entities::user::{changed_password_after, role_of};
use crate::entities::{Role, USER};
use crate::error::{Error, Result};
use crate::state::AppState;
use crate::store::{id_of, Document};

/// Message for requests without a token
pub const NOT_LOGGED_IN: &str = "You are not logged in! Please log in to get access.";

/// The authenticated user of a request
#[derive(Debug, Clone)]
pub struct CurrentUser {
    /// User id
    pub id: String,
    /// Access level
    pub role: Role,
    /// User document, hidden fields excluded
    pub document: Document,
}

impl CurrentUser {
    /// Wrap a loaded user document
    pub fn from_document(document: Document) -> Result<Self> {
        let id = id_of(&document)
            .ok_or_else(|| Error::Internal("User document without _id".to_string()))?
            .to_string();
        Ok(Self {
            id,
            role: role_of(&document),
            document,
        })
    }

    /// String field of the user document
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.document.get(field).and_then(Value::as_str)
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| Error::Unauthorized(NOT_LOGGED_IN.to_string()))
    }
}

/// Require a valid session token from a still-existing user
pub async fn protect(State(state): State<AppState>, mut request: Request, next: Next) -> Result<Response> {
    let token = extract_token(request.headers())
        .ok_or_else(|| Error::Unauthorized(NOT_LOGGED_IN.to_string()))?;
    let claims = state.jwt().verify(&token)?;

    let user = state
        .db()
        .model(USER)?
        .find_by_id(&claims.id)
        .exec_one()
        .await?
        .ok_or_else(|| {
            Error::Unauthorized("The user belonging to this token does no longer exist.".to_string())
        })?;

    if changed_password_after(&user, claims.iat) {
        return Err(Error::Unauthorized(
            "User recently changed password! Please log in again.".to_string(),
        ));
    }

    let current = CurrentUser::from_document(user)?;
    tracing::debug!(user = %current.id, role = %current.role, "Request authenticated");
    request.extensions_mut().insert(current);
    Ok(next.run(request).await)
}

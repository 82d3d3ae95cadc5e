//! Request extractors mapping rejections onto [`Error`]

use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
    Json,
};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::features::{RequestParams, DEFAULT_WHITELIST};
use crate::middleware::sanitize;
use crate::store::Document;

/// Sanitized JSON object body
#[derive(Debug, Clone, Default)]
pub struct JsonBody(pub Document);

impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<Value>::from_request(req, state)
            .await
            .map_err(|e| Error::operational(e.status(), e.body_text()))?;
        match sanitize(value) {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(Error::BadRequest("Request body must be a JSON object".to_string())),
        }
    }
}

/// Query string as [`RequestParams`], with repeated keys collapsed
#[derive(Debug, Clone, Default)]
pub struct Params(pub RequestParams);

impl<S> FromRequestParts<S> for Params
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map_err(|e| Error::BadRequest(e.body_text()))?;
        Ok(Self(RequestParams::from_pairs(pairs, &DEFAULT_WHITELIST)))
    }
}

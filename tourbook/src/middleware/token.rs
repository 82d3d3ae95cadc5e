//! Session token extraction

use axum::http::{header, HeaderMap};

/// Name of the cookie carrying the session token
pub const JWT_COOKIE: &str = "jwt";

/// Placeholder written to the cookie on logout
pub const LOGGED_OUT: &str = "loggedout";

/// Token from `Authorization: Bearer ...`, else from the `jwt` cookie
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == JWT_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|t| !t.is_empty() && t != LOGGED_OUT)
}

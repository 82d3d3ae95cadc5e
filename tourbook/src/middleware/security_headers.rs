//! Security headers middleware
//!
//! Applies standard HTTP security headers using
//! `tower_http::set_header::SetResponseHeaderLayer`.

use axum::http::{header, HeaderName, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

/// HSTS max-age sent in production (180 days)
const HSTS_MAX_AGE_SECS: u64 = 15_552_000;

/// Apply security headers to the router
///
/// HSTS is only sent in production, where TLS terminates in front of us.
pub fn apply_security_headers(mut app: Router, enabled: bool, production: bool) -> Router {
    if !enabled {
        return app;
    }

    if production {
        let value = format!("max-age={}; includeSubDomains", HSTS_MAX_AGE_SECS);
        if let Ok(hv) = HeaderValue::from_str(&value) {
            app = app.layer(SetResponseHeaderLayer::overriding(
                header::STRICT_TRANSPORT_SECURITY,
                hv,
            ));
        }
    }

    app.layer(SetResponseHeaderLayer::if_not_present(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    ))
    .layer(SetResponseHeaderLayer::if_not_present(
        header::X_FRAME_OPTIONS,
        HeaderValue::from_static("SAMEORIGIN"),
    ))
    // Modern recommendation: disable the browser XSS filter
    .layer(SetResponseHeaderLayer::if_not_present(
        header::X_XSS_PROTECTION,
        HeaderValue::from_static("0"),
    ))
    .layer(SetResponseHeaderLayer::if_not_present(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    ))
    .layer(SetResponseHeaderLayer::if_not_present(
        HeaderName::from_static("x-dns-prefetch-control"),
        HeaderValue::from_static("off"),
    ))
}

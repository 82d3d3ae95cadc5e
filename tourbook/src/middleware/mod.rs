//! Middleware: authentication, access control, rate limiting, request
//! tracking, security headers and body sanitization

pub mod access;
pub mod jwt;
pub mod rate_limit;
pub mod request_tracking;
pub mod sanitize;
pub mod security_headers;
pub mod token;

pub use access::{restrict_to, AllowedRoles};
pub use jwt::{protect, CurrentUser, NOT_LOGGED_IN};
pub use rate_limit::ApiRateLimit;
pub use request_tracking::{
    request_id_header, request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
    SENSITIVE_HEADERS,
};
pub use sanitize::sanitize;
pub use security_headers::apply_security_headers;
pub use token::{extract_token, JWT_COOKIE, LOGGED_OUT};

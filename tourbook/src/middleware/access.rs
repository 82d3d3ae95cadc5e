//! Role-based access control

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::jwt::{CurrentUser, NOT_LOGGED_IN};
use crate::entities::Role;
use crate::error::{Error, Result};

/// Roles allowed through [`restrict_to`]
#[derive(Debug, Clone, Copy)]
pub struct AllowedRoles(pub &'static [Role]);

/// Reject principals whose role is not allowed; must run after `protect`
///
/// ```rust,ignore
/// router.route_layer(middleware::from_fn_with_state(AllowedRoles(&[Role::Admin]), restrict_to))
/// ```
pub async fn restrict_to(
    State(AllowedRoles(roles)): State<AllowedRoles>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let role = request
        .extensions()
        .get::<CurrentUser>()
        .map(|user| user.role)
        .ok_or_else(|| Error::Unauthorized(NOT_LOGGED_IN.to_string()))?;

    if !roles.contains(&role) {
        tracing::debug!(%role, "Role not permitted");
        return Err(Error::Forbidden(
            "You do not have permission to perform this action".to_string(),
        ));
    }
    Ok(next.run(request).await)
}

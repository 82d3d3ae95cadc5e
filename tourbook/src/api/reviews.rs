//! Review routes, standalone and nested under a tour

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    middleware,
    routing::post,
    Router,
};
use serde_json::Value;

use crate::entities::{Role, REVIEW};
use crate::error::Result;
use crate::handlers::{Envelope, JsonBody, ResourceHandlers};
use crate::middleware::{protect, restrict_to, AllowedRoles, CurrentUser};
use crate::state::AppState;

/// Path parameter naming the parent tour in nested routes
pub const TOUR_PARAM: &str = "tour_id";

fn handlers() -> ResourceHandlers {
    ResourceHandlers::new(REVIEW).scoped_by(TOUR_PARAM, "tour")
}

/// Review routes, mounted at `/api/v1/reviews` and `/api/v1/tours/{tour_id}/reviews`
pub fn router(state: &AppState) -> Router<AppState> {
    let reviews = handlers();
    Router::new()
        .route(
            "/",
            reviews.get_all().merge(post(create_review).route_layer(
                middleware::from_fn_with_state(AllowedRoles(&[Role::User]), restrict_to),
            )),
        )
        .route(
            "/{id}",
            reviews.get_one().merge(
                reviews
                    .update_one()
                    .merge(reviews.delete_one())
                    .route_layer(middleware::from_fn_with_state(
                        AllowedRoles(&[Role::User, Role::Admin]),
                        restrict_to,
                    )),
            ),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), protect))
}

/// `POST /`: tour from the path and author from the session unless given
async fn create_review(
    State(state): State<AppState>,
    current: CurrentUser,
    path: Option<Path<HashMap<String, String>>>,
    JsonBody(mut body): JsonBody,
) -> Result<Envelope> {
    if !body.contains_key("tour") {
        if let Some(tour) = path.as_ref().and_then(|Path(p)| p.get(TOUR_PARAM)) {
            body.insert("tour".to_string(), Value::String(tour.clone()));
        }
    }
    if !body.contains_key("user") {
        body.insert("user".to_string(), Value::String(current.id.clone()));
    }
    handlers().create(&state, body).await
}

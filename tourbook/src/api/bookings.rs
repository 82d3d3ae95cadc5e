//! Booking routes: checkout sessions and staff management

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::get,
    Router,
};
use serde_json::Value;

use crate::entities::{Role, BOOKING, TOUR};
use crate::error::{Error, Result};
use crate::handlers::{Envelope, ResourceHandlers};
use crate::middleware::{protect, restrict_to, AllowedRoles, CurrentUser};
use crate::model::NOT_FOUND_MESSAGE;
use crate::services::CheckoutRequest;
use crate::state::AppState;
use crate::store::number;

/// Booking routes, mounted at `/api/v1/bookings`
pub fn router(state: &AppState) -> Router<AppState> {
    let bookings = ResourceHandlers::new(BOOKING);

    let staff = Router::new()
        .route("/", bookings.get_all().merge(bookings.create_one()))
        .route(
            "/{id}",
            bookings
                .get_one()
                .merge(bookings.update_one())
                .merge(bookings.delete_one()),
        )
        .route_layer(middleware::from_fn_with_state(
            AllowedRoles(&[Role::Admin, Role::LeadGuide]),
            restrict_to,
        ));

    Router::new()
        .route("/checkout-session/{tour_id}", get(checkout_session))
        .merge(staff)
        .route_layer(middleware::from_fn_with_state(state.clone(), protect))
}

/// `GET /checkout-session/{tour_id}`
async fn checkout_session(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(tour_id): Path<String>,
) -> Result<Envelope> {
    let gateway = state.payments().ok_or_else(|| {
        Error::operational(StatusCode::SERVICE_UNAVAILABLE, "Payments are not available")
    })?;

    let tour = state
        .db()
        .model(TOUR)?
        .find_by_id(&tour_id)
        .exec_one()
        .await?
        .ok_or_else(|| Error::NotFound(NOT_FOUND_MESSAGE.to_string()))?;

    let text = |field: &str| tour.get(field).and_then(Value::as_str).unwrap_or_default().to_string();
    let price = tour.get("price").and_then(Value::as_f64).unwrap_or_default();
    let public_url = &state.config().email.public_url;

    let request = CheckoutRequest {
        tour_id: tour_id.clone(),
        tour_name: text("name"),
        description: text("summary"),
        price,
        customer_email: current.get_str("email").unwrap_or_default().to_string(),
        success_url: format!(
            "{}/?tour={}&user={}&price={}",
            public_url,
            tour_id,
            current.id,
            number(price)
        ),
        cancel_url: format!("{}/tour/{}", public_url, text("slug")),
    };

    let session = gateway.create_checkout_session(&request).await?;
    let session = serde_json::to_value(session)
        .map_err(|e| Error::Internal(format!("Failed to encode checkout session: {}", e)))?;
    Ok(Envelope::data("session", session))
}

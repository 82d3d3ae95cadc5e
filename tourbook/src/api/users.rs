//! User routes: authentication, self-service account, admin management

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::Response,
    routing::{delete, get, patch, post},
    Router,
};
use serde_json::Value;

use super::auth;
use crate::entities::{Role, USER};
use crate::error::{Error, Result};
use crate::handlers::{no_content, Envelope, JsonBody, ResourceHandlers};
use crate::middleware::{protect, restrict_to, AllowedRoles, CurrentUser};
use crate::model::{UpdateOptions, NOT_FOUND_MESSAGE};
use crate::state::AppState;
use crate::store::Document;

/// Fields a user may change about themselves
const SELF_SERVICE_FIELDS: [&str; 2] = ["name", "email"];

/// User routes, mounted at `/api/v1/users`
pub fn router(state: &AppState) -> Router<AppState> {
    let users = ResourceHandlers::new(USER);

    let public = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/forgotPassword", post(auth::forgot_password))
        .route("/resetPassword/{token}", patch(auth::reset_password));

    let account = Router::new()
        .route("/updateMyPassword", patch(auth::update_my_password))
        .route("/me", get(get_me))
        .route("/updateMe", patch(update_me))
        .route("/deleteMe", delete(delete_me));

    let admin = Router::new()
        .route("/", users.get_all().post(create_user))
        .route(
            "/{id}",
            users
                .get_one()
                .merge(users.update_one())
                .merge(users.delete_one()),
        )
        .route_layer(middleware::from_fn_with_state(
            AllowedRoles(&[Role::Admin]),
            restrict_to,
        ));

    public.merge(
        account
            .merge(admin)
            .route_layer(middleware::from_fn_with_state(state.clone(), protect)),
    )
}

/// `GET /me`
async fn get_me(State(state): State<AppState>, current: CurrentUser) -> Result<Envelope> {
    ResourceHandlers::new(USER).read(&state, &current.id).await
}

/// `PATCH /updateMe`: name and email only
async fn update_me(
    State(state): State<AppState>,
    current: CurrentUser,
    JsonBody(body): JsonBody,
) -> Result<Envelope> {
    if body.contains_key("password") || body.contains_key("passwordConfirm") {
        return Err(Error::BadRequest(
            "This route is not for password updates. Please use /updateMyPassword.".to_string(),
        ));
    }
    let changes: Document = body
        .into_iter()
        .filter(|(field, _)| SELF_SERVICE_FIELDS.contains(&field.as_str()))
        .collect();

    let user = state
        .db()
        .model(USER)?
        .update_by_id(&current.id, changes, UpdateOptions::default())
        .await?
        .ok_or_else(|| Error::NotFound(NOT_FOUND_MESSAGE.to_string()))?;
    Ok(Envelope::data("user", Value::Object(user)))
}

/// `DELETE /deleteMe`: deactivate the account
async fn delete_me(State(state): State<AppState>, current: CurrentUser) -> Result<Response> {
    let mut changes = Document::new();
    changes.insert("active".to_string(), Value::Bool(false));
    state
        .db()
        .model(USER)?
        .update_by_id(
            &current.id,
            changes,
            UpdateOptions {
                run_validators: false,
                ..UpdateOptions::default()
            },
        )
        .await?;
    tracing::info!(user = %current.id, "Account deactivated");
    Ok(no_content())
}

/// `POST /`: accounts are only created through signup
async fn create_user() -> Error {
    Error::operational(
        StatusCode::INTERNAL_SERVER_ERROR,
        "This route is not defined! Please use /signup instead",
    )
}

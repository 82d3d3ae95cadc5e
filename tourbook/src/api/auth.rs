//! Authentication flows: signup, login, logout, password reset and change
//!
//! Successful logins answer with the token in the body and in an HttpOnly
//! `jwt` cookie.

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::auth::{reset, ResetToken};
use crate::entities::USER;
use crate::error::{Error, Result};
use crate::handlers::{Envelope, JsonBody};
use crate::middleware::{CurrentUser, JWT_COOKIE, LOGGED_OUT};
use crate::model::{SaveOptions, NOT_FOUND_MESSAGE};
use crate::services::Email;
use crate::state::AppState;
use crate::store::{format_timestamp, id_of, now_timestamp, Document, Op};

/// Body fields accepted on signup
const SIGNUP_FIELDS: [&str; 4] = ["name", "email", "password", "passwordConfirm"];

const INCORRECT_CREDENTIALS: &str = "Incorrect email or password";

/// Seconds the logout placeholder cookie lives
const LOGOUT_COOKIE_SECS: i64 = 10;

fn cookie(value: &str, max_age_secs: i64, secure: bool) -> Result<HeaderValue> {
    let mut cookie = format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
        JWT_COOKIE, value, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|e| Error::Internal(format!("Invalid cookie value: {}", e)))
}

fn text_field<'a>(body: &'a Document, field: &str) -> Option<&'a str> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Issue a token for `user` and answer with it in body and cookie
async fn send_token(state: &AppState, mut user: Document, code: StatusCode) -> Result<Response> {
    let id = id_of(&user)
        .ok_or_else(|| Error::Internal("User document without _id".to_string()))?
        .to_string();
    let token = state.jwt().issue(&id)?;

    let config = state.config();
    let max_age = config.jwt.cookie_expires_days * 24 * 60 * 60;
    let set_cookie = cookie(&token, max_age, config.is_production())?;

    user.remove("password");
    let envelope = Envelope::data("user", Value::Object(user))
        .with_token(token)
        .with_code(code);
    Ok(([(header::SET_COOKIE, set_cookie)], envelope).into_response())
}

/// `POST /signup`
pub async fn signup(State(state): State<AppState>, JsonBody(body): JsonBody) -> Result<Response> {
    let input: Document = SIGNUP_FIELDS
        .iter()
        .filter_map(|field| body.get(*field).map(|v| (field.to_string(), v.clone())))
        .collect();
    let user = state.db().model(USER)?.create(input).await?;

    let email = user.get("email").and_then(Value::as_str).unwrap_or_default();
    let name = user.get("name").and_then(Value::as_str).unwrap_or_default();
    if let Err(e) = state
        .mailer()
        .send(Email::welcome(&state.config().email, email, name))
        .await
    {
        tracing::warn!(error = %e, "Failed to send welcome email");
    }

    tracing::info!(user = ?id_of(&user), "User signed up");
    send_token(&state, user, StatusCode::CREATED).await
}

/// `POST /login`
pub async fn login(State(state): State<AppState>, JsonBody(body): JsonBody) -> Result<Response> {
    let (Some(email), Some(password)) = (text_field(&body, "email"), text_field(&body, "password"))
    else {
        return Err(Error::BadRequest("Please provide email and password".to_string()));
    };

    let model = state.db().model(USER)?;
    let record = model
        .find()
        .where_eq("email", email)
        .exec_record()
        .await?
        .ok_or_else(|| Error::Unauthorized(INCORRECT_CREDENTIALS.to_string()))?;

    let hash = record.get_str("password").unwrap_or_default().to_string();
    if hash.is_empty()
        || !state
            .hasher()
            .verify_blocking(password.to_string(), hash)
            .await?
    {
        return Err(Error::Unauthorized(INCORRECT_CREDENTIALS.to_string()));
    }

    let user = model.present(model.strip_hidden(record.into_document()));
    send_token(&state, user, StatusCode::OK).await
}

/// `GET /logout`: replace the cookie with a short-lived placeholder
pub async fn logout(State(state): State<AppState>) -> Result<Response> {
    let set_cookie = cookie(LOGGED_OUT, LOGOUT_COOKIE_SECS, state.config().is_production())?;
    Ok(([(header::SET_COOKIE, set_cookie)], Envelope::success()).into_response())
}

/// `POST /forgotPassword`: email a reset link
pub async fn forgot_password(State(state): State<AppState>, JsonBody(body): JsonBody) -> Result<Envelope> {
    let email = text_field(&body, "email").unwrap_or_default();
    let model = state.db().model(USER)?;
    let mut record = model
        .find()
        .where_eq("email", email)
        .exec_record()
        .await?
        .ok_or_else(|| Error::NotFound("There is no user with this email address".to_string()))?;

    let ttl = chrono::Duration::seconds(state.config().password.reset_token_ttl_secs);
    let token = ResetToken::generate(ttl);
    record.set("passwordResetToken", token.digest.clone());
    record.set("passwordResetExpires", format_timestamp(token.expires_at));
    model.save(&mut record, SaveOptions { validate: false }).await?;

    let config = &state.config().email;
    let reset_url = format!("{}/api/v1/users/resetPassword/{}", config.public_url, token.plain);
    let to = record.get_str("email").unwrap_or(email).to_string();
    let message = Email::password_reset(config, &to, &reset_url, ttl.num_minutes());

    if let Err(e) = state.mailer().send(message).await {
        tracing::error!(error = %e, "Failed to send password reset email");
        record.unset("passwordResetToken");
        record.unset("passwordResetExpires");
        model.save(&mut record, SaveOptions { validate: false }).await?;
        return Err(Error::operational(
            StatusCode::INTERNAL_SERVER_ERROR,
            "There was an error sending the email. Try again later!",
        ));
    }

    Ok(Envelope::success().with_message("Token sent to email!"))
}

/// `PATCH /resetPassword/{token}`
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    JsonBody(body): JsonBody,
) -> Result<Response> {
    let model = state.db().model(USER)?;
    let mut record = model
        .find()
        .where_eq("passwordResetToken", reset::digest(&token))
        .and("passwordResetExpires", Op::Gt(Value::String(now_timestamp())))
        .exec_record()
        .await?
        .ok_or_else(|| Error::BadRequest("Token is invalid or has expired".to_string()))?;

    record.set("password", body.get("password").cloned().unwrap_or(Value::Null));
    record.set(
        "passwordConfirm",
        body.get("passwordConfirm").cloned().unwrap_or(Value::Null),
    );
    record.unset("passwordResetToken");
    record.unset("passwordResetExpires");
    let user = model.save(&mut record, SaveOptions::default()).await?;

    tracing::info!(user = ?record.id(), "Password reset");
    send_token(&state, user, StatusCode::OK).await
}

/// `PATCH /updateMyPassword`
pub async fn update_my_password(
    State(state): State<AppState>,
    current: CurrentUser,
    JsonBody(body): JsonBody,
) -> Result<Response> {
    let model = state.db().model(USER)?;
    let mut record = model
        .find_by_id(&current.id)
        .exec_record()
        .await?
        .ok_or_else(|| Error::NotFound(NOT_FOUND_MESSAGE.to_string()))?;

    let supplied = body
        .get("passwordCurrent")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let hash = record.get_str("password").unwrap_or_default().to_string();
    if !state.hasher().verify_blocking(supplied, hash).await? {
        return Err(Error::Unauthorized("Your current password is wrong".to_string()));
    }

    record.set("password", body.get("password").cloned().unwrap_or(Value::Null));
    record.set(
        "passwordConfirm",
        body.get("passwordConfirm").cloned().unwrap_or(Value::Null),
    );
    let user = model.save(&mut record, SaveOptions::default()).await?;
    send_token(&state, user, StatusCode::OK).await
}

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::accounts::Registration;
use crate::auth::session;
use crate::config::AuthConfig;
use crate::error::AppResult;
use crate::extractors::{session_token, JsonBody, PathParam};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts/register", post(register))
        .route("/accounts/activate/{key}", get(activate))
        .route("/accounts/login", post(login))
        .route("/accounts/logout", post(logout))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

// -- Cookie helpers --

pub(crate) fn session_cookie(auth: &AuthConfig, token: &str) -> String {
    let max_age_secs = auth.session_hours.saturating_mul(3600);
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        auth.cookie_name, token, max_age_secs
    )
}

pub(crate) fn clear_session_cookie(auth: &AuthConfig) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        auth.cookie_name
    )
}

/// POST /accounts/register
/// Body: { username, email, password1, password2 }
/// Returns 201 with the new (inactive) user; the activation link is logged.
pub async fn register(
    State(state): State<AppState>,
    JsonBody(registration): JsonBody<Registration>,
) -> AppResult<Response> {
    let registered = state.accounts.register(registration).await?;
    let body = json!({
        "user": registered.user,
        "profile": registered.profile,
        "message": "Check your email to activate the account",
    });
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// GET /accounts/activate/{key}
pub async fn activate(
    State(state): State<AppState>,
    PathParam(key): PathParam<String>,
) -> AppResult<Response> {
    let user = state.accounts.activate(&key).await?;
    Ok(Json(user).into_response())
}

/// POST /accounts/login
/// Body: { username, password }
/// Returns the user with a session cookie
pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> AppResult<Response> {
    let user = state.accounts.login(&req.username, &req.password).await?;
    let auth = &state.config.auth;
    let token = session::create_session(&state.db, user.id, auth.session_hours)?;
    tracing::info!(user = %user.id, "Logged in");

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie(auth, &token))],
        Json(user),
    )
        .into_response())
}

/// POST /accounts/logout - delete the session and clear the cookie
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let auth = &state.config.auth;
    if let Some(token) = session_token(&headers, &auth.cookie_name) {
        if let Err(e) = session::delete_session(&state.db, token) {
            tracing::warn!("Failed to delete session: {}", e);
        }
    }

    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, clear_session_cookie(auth))],
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookies_use_the_configured_name() {
        let auth = AuthConfig::default();
        let cookie = session_cookie(&auth, "tok");
        assert!(cookie.starts_with("imager_session=tok;"));
        assert!(cookie.contains("Max-Age=2592000"));
        assert!(cookie.contains("HttpOnly"));

        let cleared = clear_session_cookie(&auth);
        assert!(cleared.starts_with("imager_session=;"));
        assert!(cleared.ends_with("Max-Age=0"));
    }
}

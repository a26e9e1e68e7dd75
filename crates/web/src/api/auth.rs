//! Authentication endpoints (simple password-based sessions) and caller
//! identity resolution.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::status::AppError;
use crate::{AppState, Session};

/// Header carrying the caller id when authentication is disabled.
pub const USER_ID_HEADER: &str = "x-user-id";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_id: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    user_id: String,
    expires_at: String,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/verify", post(verify))
}

async fn login(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(body) = body?;
    let configured_password = state.config.web.admin_password.as_deref().unwrap_or("");
    if configured_password.is_empty() {
        return Err(AppError::BadRequest(
            "authentication is not configured (no password set)".into(),
        ));
    }

    let user_id = body.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::BadRequest("userId must not be empty".into()));
    }

    let password_matches: bool = body
        .password
        .as_bytes()
        .ct_eq(configured_password.as_bytes())
        .into();
    if !password_matches {
        warn!(user_id, "login rejected");
        return Err(AppError::Unauthorized("invalid password".into()));
    }

    let token = Uuid::new_v4().to_string();
    let expires_at = session_expiry(Utc::now(), state.config.web.session_ttl_hours)
        .ok_or_else(|| AppError::Internal("session lifetime out of range".into()))?;

    state.sessions.write().await.insert(
        token.clone(),
        Session {
            user_id: user_id.to_string(),
            expires_at,
        },
    );
    info!(user_id, "session created");

    Ok(Json(LoginResponse {
        token,
        user_id: user_id.to_string(),
        expires_at: expires_at.to_rfc3339(),
    }))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(body) = body?;
    state.sessions.write().await.remove(&body.token);
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn verify(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(body) = body?;
    let sessions = state.sessions.read().await;
    let reply = match sessions.get(&body.token) {
        Some(session) if session.expires_at > Utc::now() => serde_json::json!({
            "valid": true,
            "userId": session.user_id,
            "expiresAt": session.expires_at.to_rfc3339(),
        }),
        _ => serde_json::json!({ "valid": false }),
    };
    Ok(Json(reply))
}

/// Expiry for a session opened at `now`, or `None` when the lifetime does
/// not fit in a timestamp.
fn session_expiry(now: DateTime<Utc>, ttl_hours: u64) -> Option<DateTime<Utc>> {
    let ttl = Duration::try_hours(i64::try_from(ttl_hours).ok()?)?;
    now.checked_add_signed(ttl)
}

/// Resolve the calling user.
///
/// With a password configured the caller must present
/// `Authorization: Bearer <token>` for a live session. Without one the
/// `X-User-Id` header names the caller. Expired sessions are pruned on the
/// way through.
pub async fn authenticate(state: &Arc<AppState>, headers: &HeaderMap) -> Result<String, AppError> {
    if !state.config.web.auth_enabled() {
        return headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::Unauthorized("missing X-User-Id header".into()));
    }

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing or invalid Authorization header".into()))?;

    let now = Utc::now();
    let mut sessions = state.sessions.write().await;
    sessions.retain(|_, session| session.expires_at > now);

    sessions
        .get(token)
        .map(|session| session.user_id.clone())
        .ok_or_else(|| AppError::Unauthorized("session expired or invalid".into()))
}

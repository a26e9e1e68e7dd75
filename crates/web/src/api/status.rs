//! Status and health check endpoints, plus the shared API error type.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::error;

use notemerge_core::errors::{DatabaseError, DocumentError, ForkError, PullRequestError};
use notemerge_core::merge::ConflictHunk;
use notemerge_core::models::PrStatus;

use crate::api::auth::authenticate;
use crate::AppState;

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    open_pull_requests: i64,
    merged_pull_requests: i64,
    closed_pull_requests: i64,
    auth_enabled: bool,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/status/health", get(health_check))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn get_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    authenticate(&state, &headers).await?;

    Ok(Json(StatusResponse {
        open_pull_requests: state.db.count_pull_requests_by_status(PrStatus::Open)?,
        merged_pull_requests: state.db.count_pull_requests_by_status(PrStatus::Merged)?,
        closed_pull_requests: state.db.count_pull_requests_by_status(PrStatus::Closed)?,
        auth_enabled: state.config.web.auth_enabled(),
    }))
}

// ---------------------------------------------------------------------------
// Shared error type for API handlers
// ---------------------------------------------------------------------------

/// API error that converts to a JSON response `{ "error", "code" }`.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict {
        message: String,
        conflicts: Option<Vec<ConflictHunk>>,
    },
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = match self {
            AppError::Conflict { message, conflicts } => {
                let mut body = serde_json::json!({ "error": message, "code": code });
                if let Some(conflicts) = conflicts {
                    body["conflicts"] = serde_json::json!(conflicts);
                }
                body
            }
            AppError::BadRequest(message)
            | AppError::NotFound(message)
            | AppError::Unauthorized(message)
            | AppError::Forbidden(message)
            | AppError::Internal(message) => {
                serde_json::json!({ "error": message, "code": code })
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Malformed or incomplete JSON bodies are client errors like any other.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<DatabaseError> for AppError {
    fn from(e: DatabaseError) -> Self {
        error!(error = %e, "database error");
        AppError::Internal(format!("database error: {e}"))
    }
}

impl From<PullRequestError> for AppError {
    fn from(e: PullRequestError) -> Self {
        match e {
            PullRequestError::NotFound(_) | PullRequestError::DocumentNotFound(_) => {
                AppError::NotFound(e.to_string())
            }
            PullRequestError::InvalidState { .. } | PullRequestError::Validation(_) => {
                AppError::BadRequest(e.to_string())
            }
            PullRequestError::Forbidden { .. } | PullRequestError::DocumentForbidden { .. } => {
                AppError::Forbidden(e.to_string())
            }
            PullRequestError::ConflictDetected(hunks) => AppError::Conflict {
                message: "merge conflicts detected".into(),
                conflicts: Some(hunks),
            },
            PullRequestError::StaleTarget { .. } | PullRequestError::ConcurrentUpdate { .. } => {
                AppError::Conflict {
                    message: e.to_string(),
                    conflicts: None,
                }
            }
            PullRequestError::Database(db) => db.into(),
        }
    }
}

impl From<ForkError> for AppError {
    fn from(e: ForkError) -> Self {
        match e {
            ForkError::NotFound(_) => AppError::NotFound(e.to_string()),
            ForkError::Forbidden { .. } => AppError::Forbidden(e.to_string()),
            ForkError::Database(db) => db.into(),
        }
    }
}

impl From<DocumentError> for AppError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::NotFound(_) => AppError::NotFound(e.to_string()),
            DocumentError::Forbidden { .. } => AppError::Forbidden(e.to_string()),
            DocumentError::Validation(_) => AppError::BadRequest(e.to_string()),
            DocumentError::Database(db) => db.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_request_error_mapping() {
        let cases = [
            (PullRequestError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (PullRequestError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                PullRequestError::InvalidState {
                    id: "x".into(),
                    status: PrStatus::Closed,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                PullRequestError::Forbidden {
                    id: "x".into(),
                    user_id: "u".into(),
                    action: "merge",
                },
                StatusCode::FORBIDDEN,
            ),
            (
                PullRequestError::DocumentForbidden {
                    document_id: "d".into(),
                    user_id: "u".into(),
                },
                StatusCode::FORBIDDEN,
            ),
            (PullRequestError::ConflictDetected(Vec::new()), StatusCode::CONFLICT),
            (
                PullRequestError::ConcurrentUpdate { id: "x".into() },
                StatusCode::CONFLICT,
            ),
            (
                PullRequestError::StaleTarget {
                    id: "x".into(),
                    document_id: "d".into(),
                },
                StatusCode::CONFLICT,
            ),
        ];
        for (err, expected) in cases {
            let app: AppError = err.into();
            assert_eq!(app.status_and_code().0, expected);
        }
    }

    #[test]
    fn test_conflict_response_status() {
        let app: AppError = PullRequestError::ConflictDetected(vec![ConflictHunk {
            source_lines: vec!["s".into()],
            base_lines: vec![],
            target_lines: vec!["t".into()],
        }])
        .into();
        let response = app.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}

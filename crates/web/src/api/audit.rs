//! Audit log API endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use notemerge_core::db::queries::AuditLogEntry;

use crate::api::auth::authenticate;
use crate::api::status::AppError;
use crate::AppState;

#[derive(Deserialize)]
pub struct AuditQuery {
    pub limit: Option<u32>,
}

#[derive(Serialize)]
struct AuditListResponse {
    entries: Vec<AuditLogEntry>,
    total: usize,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/audit", get(list_audit))
}

async fn list_audit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditListResponse>, AppError> {
    authenticate(&state, &headers).await?;

    let limit = query.limit.unwrap_or(50).min(500);
    let entries = state.db.list_audit_log(limit)?;

    Ok(Json(AuditListResponse {
        total: entries.len(),
        entries,
    }))
}

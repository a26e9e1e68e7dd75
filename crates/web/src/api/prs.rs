//! Pull request endpoints.
//!
//! Create, review (`GET`, diff), merge, resolve and close. Merge conflicts
//! come back as `409` with the hunks in the body; the pull request stays
//! open and its `mergeConflicts` field is updated.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use notemerge_core::models::{PrStatus, PullRequest};
use notemerge_core::pull_request::{
    CreatePullRequest, MergeSuccess, PullRequestDetails, PullRequestDiff,
};

use crate::api::auth::authenticate;
use crate::api::status::AppError;
use crate::AppState;

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    #[serde(default)]
    pub resolved_content: Option<String>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/prs", post(create_pr).get(list_prs))
        .route("/api/prs/:id", get(get_pr))
        .route("/api/prs/:id/diff", get(get_diff))
        .route("/api/prs/:id/merge", post(merge_pr))
        .route("/api/prs/:id/resolve", post(resolve_pr))
        .route("/api/prs/:id/close", post(close_pr))
}

async fn create_pr(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<CreatePullRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PullRequest>), AppError> {
    let user_id = authenticate(&state, &headers).await?;
    let Json(body) = body?;
    let pr = state.prs.create(&user_id, body)?;
    Ok((StatusCode::CREATED, Json(pr)))
}

/// Open pull requests that target documents owned by the caller.
async fn list_prs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PullRequest>>, AppError> {
    let user_id = authenticate(&state, &headers).await?;

    match query.status.as_deref().map(PrStatus::parse) {
        None | Some(Some(PrStatus::Open)) => Ok(Json(state.prs.list_pending(&user_id)?)),
        Some(_) => Err(AppError::BadRequest(
            "only status=open is supported".into(),
        )),
    }
}

async fn get_pr(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<PullRequestDetails>, AppError> {
    authenticate(&state, &headers).await?;
    Ok(Json(state.prs.get_details(&id)?))
}

async fn get_diff(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<PullRequestDiff>, AppError> {
    authenticate(&state, &headers).await?;
    Ok(Json(state.prs.diff(&id)?))
}

async fn merge_pr(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<MergeSuccess>, AppError> {
    let user_id = authenticate(&state, &headers).await?;
    let merged = state.prs.attempt_merge(&id, &user_id)?;
    info!(pr_id = %id, user_id = %user_id, "merge request served");
    Ok(Json(merged))
}

async fn resolve_pr(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Json<MergeSuccess>, AppError> {
    let user_id = authenticate(&state, &headers).await?;
    let Json(body) = body?;
    let resolved = body.resolved_content.as_deref().unwrap_or_default();
    Ok(Json(state.prs.resolve(&id, &user_id, resolved)?))
}

async fn close_pr(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<PullRequest>, AppError> {
    let user_id = authenticate(&state, &headers).await?;
    Ok(Json(state.prs.close(&id, &user_id)?))
}

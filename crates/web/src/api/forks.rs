//! Fork endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};

use notemerge_core::fork::ForkResult;
use notemerge_core::models::Fork;

use crate::api::auth::authenticate;
use crate::api::status::AppError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/notes/:id/fork", post(fork_note))
        .route("/api/notes/:id/forks", get(list_forks))
}

async fn fork_note(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<ForkResult>), AppError> {
    let user_id = authenticate(&state, &headers).await?;
    let result = state.forks.fork(&id, &user_id)?;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn list_forks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<Fork>>, AppError> {
    authenticate(&state, &headers).await?;
    Ok(Json(state.forks.list_forks_of(&id)?))
}

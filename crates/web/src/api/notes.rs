//! Document endpoints: create, read, edit, share.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use notemerge_core::models::{Access, Collaborator, Document, Visibility};

use crate::api::auth::authenticate;
use crate::api::status::AppError;
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateNoteRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Deserialize)]
pub struct UpdateNoteRequest {
    pub content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCollaboratorRequest {
    pub user_id: String,
    pub access: Access,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/notes", post(create_note))
        .route("/api/notes/:id", get(get_note).put(update_note))
        .route("/api/notes/:id/collaborators", post(add_collaborator))
}

async fn create_note(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<CreateNoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Document>), AppError> {
    let user_id = authenticate(&state, &headers).await?;
    let Json(body) = body?;
    let doc = state
        .documents
        .create(&user_id, &body.title, &body.content, body.visibility)?;
    Ok((StatusCode::CREATED, Json(doc)))
}

async fn get_note(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError> {
    let user_id = authenticate(&state, &headers).await?;
    Ok(Json(state.documents.get(&id, &user_id)?))
}

async fn update_note(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<UpdateNoteRequest>, JsonRejection>,
) -> Result<Json<Document>, AppError> {
    let user_id = authenticate(&state, &headers).await?;
    let Json(body) = body?;
    Ok(Json(state.documents.update_content(&id, &user_id, &body.content)?))
}

async fn add_collaborator(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<AddCollaboratorRequest>, JsonRejection>,
) -> Result<Json<Vec<Collaborator>>, AppError> {
    let user_id = authenticate(&state, &headers).await?;
    let Json(body) = body?;
    let collaborators =
        state
            .documents
            .add_collaborator(&id, &user_id, body.user_id.trim(), body.access)?;
    Ok(Json(collaborators))
}

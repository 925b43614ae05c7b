//! HTTP API over the note and block services.
//!
//! Every route needs a bearer token. Success bodies carry `"success": true`;
//! failures map to status codes in [`error::ApiError`].

mod auth;
mod error;
mod json;

pub use auth::Caller;
pub use error::ApiError;
pub use json::ApiJson;

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use note_hub_core::{
    access::CollaboratorsUpdate,
    model::{BlockPatch, NewBlock, NoteDraft, NotePatch},
    services::{Hub, NoteUpdate},
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
}

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Deserialize)]
struct StackRequest {
    #[serde(default)]
    stack: String,
}

#[derive(Deserialize)]
struct CollaboratorsRequest {
    #[serde(default)]
    collaborators: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateBlockRequest {
    text: Option<String>,
    #[serde(rename = "type")]
    block_type: Option<String>,
    index: Option<i64>,
    expected_version: Option<u64>,
}

pub fn router(hub: Hub) -> Router {
    Router::new()
        .route("/notes", post(create_note))
        .route("/notes/delete-by-stack", post(delete_notes_by_stack))
        .route(
            "/notes/{owner_id}/{note_id}",
            get(get_note).put(update_note).delete(delete_note),
        )
        .route(
            "/notes/{owner_id}/{note_id}/collaborators",
            put(set_collaborators),
        )
        .route(
            "/notes/{owner_id}/{note_id}/blocks",
            get(list_blocks).post(create_block),
        )
        .route(
            "/notes/{owner_id}/{note_id}/blocks/{block_id}",
            put(update_block).delete(delete_block),
        )
        .route(
            "/notes/{owner_id}/{note_id}/blocks/{block_id}/lock",
            post(acquire_lock).put(renew_lock).delete(release_lock),
        )
        .with_state(AppState { hub })
}

async fn create_note(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiJson(draft): ApiJson<NoteDraft>,
) -> ApiResult {
    let note = state.hub.notes.create(&caller, draft).await?;
    Ok(Json(json!({ "success": true, "id": note.id, "note": note })))
}

async fn get_note(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((owner_id, note_id)): Path<(String, String)>,
) -> ApiResult {
    let note = state.hub.notes.get(&caller, &owner_id, &note_id).await?;
    Ok(Json(json!({ "success": true, "note": note })))
}

async fn update_note(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((owner_id, note_id)): Path<(String, String)>,
    ApiJson(patch): ApiJson<NotePatch>,
) -> ApiResult {
    match state
        .hub
        .notes
        .update(&caller, Some(&owner_id), &note_id, patch)
        .await?
    {
        NoteUpdate::Unchanged => Ok(Json(json!({ "success": true, "noChange": true }))),
        NoteUpdate::Updated => Ok(Json(json!({ "success": true }))),
    }
}

async fn delete_note(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((owner_id, note_id)): Path<(String, String)>,
) -> ApiResult {
    state
        .hub
        .notes
        .delete(&caller, Some(&owner_id), &note_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}

async fn delete_notes_by_stack(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ApiJson(req): ApiJson<StackRequest>,
) -> ApiResult {
    let deleted = state.hub.notes.delete_by_stack(&caller, &req.stack).await?;
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}

async fn set_collaborators(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((owner_id, note_id)): Path<(String, String)>,
    ApiJson(req): ApiJson<CollaboratorsRequest>,
) -> ApiResult {
    match state
        .hub
        .gate
        .set_collaborators(&caller, &owner_id, &note_id, req.collaborators)
        .await?
    {
        CollaboratorsUpdate::Unchanged => Ok(Json(json!({ "success": true, "noChange": true }))),
        CollaboratorsUpdate::Updated { count } => {
            Ok(Json(json!({ "success": true, "count": count })))
        }
    }
}

async fn list_blocks(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((owner_id, note_id)): Path<(String, String)>,
) -> ApiResult {
    let blocks = state.hub.blocks.list(&caller, &owner_id, &note_id).await?;
    Ok(Json(json!({ "success": true, "blocks": blocks })))
}

async fn create_block(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((owner_id, note_id)): Path<(String, String)>,
    ApiJson(new): ApiJson<NewBlock>,
) -> ApiResult {
    let block = state
        .hub
        .blocks
        .create(&caller, &owner_id, &note_id, new)
        .await?;
    Ok(Json(json!({ "success": true, "id": block.id, "block": block })))
}

async fn update_block(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((owner_id, note_id, block_id)): Path<(String, String, String)>,
    ApiJson(req): ApiJson<UpdateBlockRequest>,
) -> ApiResult {
    let patch = BlockPatch {
        text: req.text,
        block_type: req.block_type,
        index: req.index,
    };
    let block = state
        .hub
        .blocks
        .update(&caller, &owner_id, &note_id, &block_id, patch, req.expected_version)
        .await?;
    Ok(Json(json!({ "success": true, "version": block.version })))
}

async fn delete_block(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((owner_id, note_id, block_id)): Path<(String, String, String)>,
) -> ApiResult {
    state
        .hub
        .blocks
        .delete(&caller, &owner_id, &note_id, &block_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}

async fn acquire_lock(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((owner_id, note_id, block_id)): Path<(String, String, String)>,
) -> ApiResult {
    let lease = state
        .hub
        .blocks
        .acquire_lock(&caller, &owner_id, &note_id, &block_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "lockHolder": lease.holder,
        "lockUntil": lease.until,
    })))
}

async fn renew_lock(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((owner_id, note_id, block_id)): Path<(String, String, String)>,
) -> ApiResult {
    let lease = state
        .hub
        .blocks
        .renew_lock(&caller, &owner_id, &note_id, &block_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "lockHolder": lease.holder,
        "lockUntil": lease.until,
    })))
}

async fn release_lock(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((owner_id, note_id, block_id)): Path<(String, String, String)>,
) -> ApiResult {
    state
        .hub
        .blocks
        .release_lock(&caller, &owner_id, &note_id, &block_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}

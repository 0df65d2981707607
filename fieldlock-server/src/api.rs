//! HTTP API for the sync server.
//!
//! The server is a dumb, trusted-with-nothing store: every field value it
//! handles is ciphertext produced client-side, and its only protocol duties
//! are version validation, the change feed, and the canary row.

use crate::error::ServerError;
use crate::store::ServerStore;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use fieldlock_types::wire::{
    CanaryEnvelope, FieldWriteRequest, FieldWriteResponse, RecordCreate, SyncChanges,
};
use fieldlock_types::RecordKey;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Builds the API router over a shared store.
pub fn build_router(store: Arc<ServerStore>) -> Router {
    Router::new()
        .route(
            "/api/key-verification",
            get(get_key_verification).post(create_key_verification),
        )
        .route("/api/records", post(create_record))
        .route("/api/records/{kind}/{id}/fields", put(update_fields))
        .route(
            "/api/records/{kind}/{id}",
            axum::routing::delete(delete_record),
        )
        .route("/api/sync", get(sync))
        .with_state(store)
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            ServerError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "message": format!("not found: {what}") })),
            )
                .into_response(),
            ServerError::AlreadyExists(what) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "message": format!("already exists: {what}") })),
            )
                .into_response(),
            ServerError::VersionConflict { conflicting_keys } => (
                StatusCode::CONFLICT,
                Json(serde_json::json!({
                    "message": format!(
                        "version conflict on fields: {}",
                        conflicting_keys.join(", ")
                    ),
                    "conflicting_keys": conflicting_keys,
                })),
            )
                .into_response(),
            ServerError::InvalidData(message) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "message": message })),
            )
                .into_response(),
            ServerError::Database(e) => {
                tracing::error!("database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "message": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}

async fn get_key_verification(
    State(store): State<Arc<ServerStore>>,
) -> Result<Json<CanaryEnvelope>, ServerError> {
    match store.canary()? {
        Some(encrypted_canary) => Ok(Json(CanaryEnvelope { encrypted_canary })),
        None => Err(ServerError::NotFound(
            "key verification (initialize with POST first)".to_string(),
        )),
    }
}

async fn create_key_verification(
    State(store): State<Arc<ServerStore>>,
    Json(body): Json<CanaryEnvelope>,
) -> Result<Response, ServerError> {
    store.init_canary(&body.encrypted_canary)?;
    info!("key verification canary initialized");
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

async fn create_record(
    State(store): State<Arc<ServerStore>>,
    Json(body): Json<RecordCreate>,
) -> Result<Response, ServerError> {
    let key = RecordKey::new(body.kind.clone(), body.id.clone());
    store.create_record(&key)?;
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

async fn update_fields(
    State(store): State<Arc<ServerStore>>,
    Path((kind, id)): Path<(String, String)>,
    Json(body): Json<FieldWriteRequest>,
) -> Result<Json<FieldWriteResponse>, ServerError> {
    let key = RecordKey::new(kind.as_str(), id.as_str());
    let updated = store.update_fields(&key, &body.fields)?;
    Ok(Json(FieldWriteResponse { updated }))
}

async fn delete_record(
    State(store): State<Arc<ServerStore>>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<StatusCode, ServerError> {
    let key = RecordKey::new(kind.as_str(), id.as_str());
    store.delete_record(&key)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct SyncParams {
    since: Option<String>,
}

async fn sync(
    State(store): State<Arc<ServerStore>>,
    Query(params): Query<SyncParams>,
) -> Result<Json<SyncChanges>, ServerError> {
    let since = match &params.since {
        Some(text) => Some(
            DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    ServerError::InvalidData(format!("bad 'since' timestamp '{text}': {e}"))
                })?,
        ),
        None => None,
    };
    Ok(Json(store.changes_since(since.as_ref())?))
}

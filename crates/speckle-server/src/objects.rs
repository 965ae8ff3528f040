//! REST endpoints for raw records: upload, download, diff and single fetch.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::debug;

use speckle_api::StreamRole;
use speckle_transport::server::wire::{self, ObjectIdsRequest, ObjectUpload};
use speckle_types::ObjectId;

use crate::error::ServerResult;
use crate::state::AppState;

async fn authorize(state: &AppState, headers: &HeaderMap, stream_id: &str, role: StreamRole) -> ServerResult<()> {
    let identity = state.identify(headers).await?;
    state.graph.read().authorize(&identity, stream_id, role)
}

/// `POST /objects/:stream`
pub async fn upload_objects(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    headers: HeaderMap,
    Json(batch): Json<Vec<ObjectUpload<'static>>>,
) -> ServerResult<(StatusCode, Json<serde_json::Value>)> {
    authorize(&state, &headers, &stream_id, StreamRole::Contributor).await?;
    let records: Vec<(ObjectId, String)> = batch
        .into_iter()
        .map(|upload| (upload.id, upload.body.into_owned()))
        .collect();
    let saved = state.objects.save(&stream_id, &records).await?;
    debug!(stream = %stream_id, saved, "stored upload batch");
    Ok((StatusCode::CREATED, Json(json!({ "saved": saved }))))
}

/// `POST /api/getobjects/:stream`, answered as `id\tbody` lines in request order.
pub async fn get_objects(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ObjectIdsRequest>,
) -> ServerResult<Response> {
    authorize(&state, &headers, &stream_id, StreamRole::Reviewer).await?;
    let found = state.objects.get_many(&stream_id, &request.objects).await?;
    let text = wire::encode_lines(
        request
            .objects
            .iter()
            .filter_map(|id| found.get_key_value(id).map(|(id, body)| (id, body.as_str()))),
    );
    Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response())
}

/// `POST /api/diff/:stream`
pub async fn diff_objects(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ObjectIdsRequest>,
) -> ServerResult<Json<HashMap<ObjectId, bool>>> {
    authorize(&state, &headers, &stream_id, StreamRole::Reviewer).await?;
    Ok(Json(state.objects.has_many(&stream_id, &request.objects).await?))
}

/// `GET /objects/:stream/:id/single`
pub async fn get_object(
    State(state): State<AppState>,
    Path((stream_id, id)): Path<(String, ObjectId)>,
    headers: HeaderMap,
) -> ServerResult<Response> {
    authorize(&state, &headers, &stream_id, StreamRole::Reviewer).await?;
    match state.objects.get(&stream_id, &id).await? {
        Some(body) => Ok(([(CONTENT_TYPE, "application/json")], body).into_response()),
        None => {
            let error = json!({ "error": format!("object {id} not found") });
            Ok((StatusCode::NOT_FOUND, Json(error)).into_response())
        }
    }
}

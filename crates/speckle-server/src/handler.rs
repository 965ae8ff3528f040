use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value as JsonValue};

use crate::state::AppState;

/// Health check handler.
pub async fn health_handler() -> Json<JsonValue> {
    Json(json!({ "status": "ok" }))
}

/// Server info: version and the limits clients should respect.
pub async fn info_handler(State(state): State<AppState>) -> Json<JsonValue> {
    Json(json!({
        "name": "speckle-server",
        "version": env!("CARGO_PKG_VERSION"),
        "maxObjectBytes": state.config.max_object_bytes,
        "maxRequestBytes": state.config.max_request_bytes,
        "streams": state.graph.read().stream_count(),
    }))
}

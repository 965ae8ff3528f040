use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{graphql, handler, objects};

/// Build the axum router with all endpoints.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_request_bytes;
    Router::new()
        .route("/health", get(handler::health_handler))
        .route("/api/info", get(handler::info_handler))
        .route("/graphql", post(graphql::graphql))
        .route("/graphql/stream", post(graphql::graphql_stream))
        .route("/objects/:stream", post(objects::upload_objects))
        .route("/objects/:stream/:id/single", get(objects::get_object))
        .route("/api/getobjects/:stream", post(objects::get_objects))
        .route("/api/diff/:stream", post(objects::diff_objects))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

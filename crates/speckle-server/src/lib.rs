//! Reference collaboration server.
//!
//! Hosts per-stream object storage over the REST endpoints that
//! `ServerTransport` speaks, and the stream/branch/commit version graph
//! over a GraphQL-shaped HTTP API with SSE subscriptions.

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod graphql;
pub mod handler;
pub mod objects;
pub mod router;
pub mod server;
pub mod state;
pub mod store;

pub use auth::{AuthProvider, Credentials, Identity, TokenAuth};
pub use config::{ServerConfig, UserConfig};
pub use error::{ServerError, ServerResult};
pub use events::{EventBus, ServerEvent};
pub use graph::{PageLimits, VersionGraph};
pub use server::SpeckleServer;
pub use state::AppState;
pub use store::ObjectStore;

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value as JsonValue};
    use tower::util::ServiceExt;

    use speckle_types::ObjectId;

    use super::*;

    const TOKEN: &str = "tok-ada";

    fn app() -> Router {
        let config = ServerConfig::default()
            .with_user("ada", "Ada", TOKEN)
            .with_user("bob", "Bob", "tok-bob");
        router::build_router(AppState::new(config))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn post(uri: &str, token: Option<&str>, body: JsonValue) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn graphql(app: &Router, token: Option<&str>, operation: &str, variables: JsonValue) -> JsonValue {
        let body = json!({ "query": "", "operationName": operation, "variables": variables });
        let (status, text) = send(app, post("/graphql", token, body)).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_str(&text).unwrap()
    }

    async fn create_stream(app: &Router) -> String {
        let response = graphql(app, Some(TOKEN), "StreamCreate", json!({ "input": { "name": "demo" } })).await;
        response["data"]["streamCreate"].as_str().unwrap().to_string()
    }

    fn record(byte: u8) -> (ObjectId, String) {
        let id = ObjectId::from_hash([byte; 32]);
        (id, format!(r#"{{"id":"{id}","speckle_type":"Base","totalChildrenCount":0}}"#))
    }

    #[tokio::test]
    async fn health_endpoint() {
        let (status, _) = send(
            &app(),
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn info_endpoint() {
        let (status, text) = send(
            &app(),
            Request::builder().uri("/api/info").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let info: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(info["maxObjectBytes"], 25_000_000);
    }

    #[tokio::test]
    async fn active_user_needs_a_token() {
        let app = app();
        let me = graphql(&app, Some(TOKEN), "ActiveUser", json!({})).await;
        assert_eq!(me["data"]["activeUser"]["name"], "Ada");

        let anonymous = graphql(&app, None, "ActiveUser", json!({})).await;
        assert_eq!(anonymous["errors"][0]["extensions"]["code"], "UNAUTHENTICATED");

        let bad = graphql(&app, Some("wrong"), "ActiveUser", json!({})).await;
        assert_eq!(bad["errors"][0]["extensions"]["code"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn unknown_operations_are_reported() {
        let response = graphql(&app(), Some(TOKEN), "DropDatabase", json!({})).await;
        assert_eq!(response["errors"][0]["extensions"]["code"], "GRAPHQL_VALIDATION_FAILED");
        assert!(response["data"].is_null());
    }

    #[tokio::test]
    async fn objects_round_trip_through_rest() {
        let app = app();
        let stream = create_stream(&app).await;
        let (id, body) = record(1);
        let (missing, _) = record(2);

        let upload = json!([{ "id": id, "body": body }]);
        let (status, _) = send(&app, post(&format!("/objects/{stream}"), Some(TOKEN), upload)).await;
        assert_eq!(status, StatusCode::CREATED);

        let ids = json!({ "objects": [id, missing] });
        let (status, text) = send(&app, post(&format!("/api/diff/{stream}"), Some(TOKEN), ids.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let present: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(present[id.to_hex()], true);
        assert_eq!(present[missing.to_hex()], false);

        let (status, text) = send(&app, post(&format!("/api/getobjects/{stream}"), Some(TOKEN), ids)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, format!("{id}\t{body}\n"));

        let single = Request::builder()
            .uri(format!("/objects/{stream}/{id}/single"))
            .header("authorization", format!("Bearer {TOKEN}"))
            .body(Body::empty())
            .unwrap();
        let (status, text) = send(&app, single).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, body);

        let absent = Request::builder()
            .uri(format!("/objects/{stream}/{missing}/single"))
            .header("authorization", format!("Bearer {TOKEN}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, absent).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn uploads_need_write_access() {
        let app = app();
        let stream = create_stream(&app).await;
        let (id, body) = record(1);
        let upload = json!([{ "id": id, "body": body }]);

        let (status, _) = send(&app, post(&format!("/objects/{stream}"), None, upload.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, post(&format!("/objects/{stream}"), Some("tok-bob"), upload.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, post("/objects/nope", Some(TOKEN), upload)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn commits_reference_stored_objects() {
        let app = app();
        let stream = create_stream(&app).await;
        let (id, body) = record(1);

        let commit = json!({ "input": { "streamId": stream, "branchName": "main", "objectId": id, "message": "first" } });
        let rejected = graphql(&app, Some(TOKEN), "CommitCreate", commit.clone()).await;
        assert_eq!(rejected["errors"][0]["extensions"]["code"], "BAD_USER_INPUT");

        let upload = json!([{ "id": id, "body": body }]);
        send(&app, post(&format!("/objects/{stream}"), Some(TOKEN), upload)).await;
        let created = graphql(&app, Some(TOKEN), "CommitCreate", commit).await;
        let commit_id = created["data"]["commitCreate"].as_str().unwrap().to_string();

        let fetched = graphql(&app, Some(TOKEN), "CommitGet", json!({ "streamId": stream, "id": commit_id })).await;
        assert_eq!(fetched["data"]["stream"]["commit"]["referencedObject"], id.to_hex());
        assert_eq!(fetched["data"]["stream"]["commit"]["authorName"], "Ada");
    }

    #[tokio::test]
    async fn permissions_are_granted_through_graphql() {
        let app = app();
        let stream = create_stream(&app).await;
        let get = json!({ "id": stream, "branchLimit": 5, "commitLimit": 5 });

        let denied = graphql(&app, Some("tok-bob"), "StreamGet", get.clone()).await;
        assert_eq!(denied["errors"][0]["extensions"]["code"], "FORBIDDEN");

        let grant = json!({ "input": { "streamId": stream, "userId": "bob", "role": "stream:reviewer" } });
        let granted = graphql(&app, Some(TOKEN), "StreamGrantPermission", grant).await;
        assert_eq!(granted["data"]["streamGrantPermission"], true);

        let allowed = graphql(&app, Some("tok-bob"), "StreamGet", get).await;
        assert_eq!(allowed["data"]["stream"]["role"], "stream:reviewer");

        let unknown = json!({ "input": { "streamId": stream, "userId": "eve", "role": "stream:owner" } });
        let response = graphql(&app, Some(TOKEN), "StreamGrantPermission", unknown).await;
        assert_eq!(response["errors"][0]["extensions"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn deleting_a_stream_drops_it() {
        let app = app();
        let stream = create_stream(&app).await;
        let deleted = graphql(&app, Some(TOKEN), "StreamDelete", json!({ "id": stream })).await;
        assert_eq!(deleted["data"]["streamDelete"], true);
        let gone = graphql(&app, Some(TOKEN), "StreamGet", json!({ "id": stream })).await;
        assert_eq!(gone["errors"][0]["extensions"]["code"], "NOT_FOUND");
    }
}

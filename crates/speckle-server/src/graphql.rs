//! The version-graph API: a `/graphql` endpoint that dispatches on
//! `operationName`, and `/graphql/stream` for subscriptions over SSE.
//!
//! Documents are not parsed. Each known operation has a fixed response
//! shape that mirrors the selection set the client sends.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::{self, Stream};
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use speckle_api::error::codes;
use speckle_api::{
    BranchCreateInput, BranchDeleteInput, BranchUpdateInput, CommitCreateInput, CommitDeleteInput,
    CommitReceivedInput, CommitUpdateInput, GraphQlError, GraphQlRequest, GraphQlResponse,
    StreamCreateInput, StreamPermissionInput, StreamRevokePermissionInput, StreamRole,
    StreamUpdateInput,
};

use crate::auth::Identity;
use crate::error::{ServerError, ServerResult};
use crate::events::ServerEvent;
use crate::state::AppState;

use DispatchError::{Failed, Unknown};

/// Typed access to a request's `variables` object.
struct Variables(JsonValue);

impl Variables {
    fn get<T: DeserializeOwned>(&self, name: &str) -> ServerResult<T> {
        let value = self
            .0
            .get(name)
            .filter(|v| !v.is_null())
            .ok_or_else(|| ServerError::BadInput(format!("missing variable ${name}")))?;
        T::deserialize(value).map_err(|e| ServerError::BadInput(format!("variable ${name}: {e}")))
    }

    fn opt<T: DeserializeOwned>(&self, name: &str) -> ServerResult<Option<T>> {
        match self.0.get(name) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(_) => self.get(name).map(Some),
        }
    }

    fn limit(&self, name: &str) -> ServerResult<usize> {
        Ok(self.opt(name)?.unwrap_or(0))
    }
}

enum DispatchError {
    Unknown(String),
    Failed(ServerError),
}

impl From<ServerError> for DispatchError {
    fn from(e: ServerError) -> Self {
        Failed(e)
    }
}

/// `POST /graphql`. Failures are reported in the `errors` array with a
/// `200 OK`, as GraphQL clients expect.
pub async fn graphql(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GraphQlRequest>,
) -> Json<GraphQlResponse<JsonValue>> {
    let operation = request.operation_name.unwrap_or_default();
    let result = match state.identify(&headers).await {
        Ok(identity) => dispatch(&state, &identity, &operation, Variables(request.variables)).await,
        Err(e) => Err(Failed(e)),
    };
    match result {
        Ok(data) => Json(GraphQlResponse::ok(data)),
        Err(Unknown(operation)) => {
            let message = format!("unknown operation '{operation}'");
            Json(GraphQlResponse::failed(vec![GraphQlError::new(message, codes::UNKNOWN_OPERATION)]))
        }
        Err(Failed(e)) => {
            if e.status().is_server_error() {
                warn!(operation = %operation, error = %e, "operation failed");
            } else {
                debug!(operation = %operation, error = %e, "operation rejected");
            }
            Json(GraphQlResponse::failed(vec![e.to_graphql()]))
        }
    }
}

async fn dispatch(
    state: &AppState,
    identity: &Identity,
    operation: &str,
    vars: Variables,
) -> Result<JsonValue, DispatchError> {
    let data = match operation {
        "ActiveUser" => json!({ "activeUser": identity.user()? }),

        "StreamGet" => {
            let stream = state.graph.read().get_stream(
                identity,
                &vars.get::<String>("id")?,
                vars.limit("branchLimit")?,
                vars.limit("commitLimit")?,
            )?;
            json!({ "stream": stream })
        }
        "StreamList" => {
            let page = state.graph.read().list_streams(
                identity,
                None,
                vars.limit("limit")?,
                vars.opt::<String>("cursor")?.as_deref(),
            )?;
            json!({ "streams": page })
        }
        "StreamSearch" => {
            let query: String = vars.get("query")?;
            let page = state.graph.read().list_streams(
                identity,
                Some(&query),
                vars.limit("limit")?,
                vars.opt::<String>("cursor")?.as_deref(),
            )?;
            json!({ "streams": page })
        }
        "StreamCreate" => {
            let input: StreamCreateInput = vars.get("input")?;
            let id = state.graph.write().create_stream(identity, &input)?;
            info!(stream = %id, name = %input.name, "created stream");
            json!({ "streamCreate": id })
        }
        "StreamUpdate" => {
            let input: StreamUpdateInput = vars.get("input")?;
            let event = state.graph.write().update_stream(identity, &input)?;
            state.events.publish(ServerEvent::StreamUpdated(event));
            json!({ "streamUpdate": true })
        }
        "StreamDelete" => {
            let id: String = vars.get("id")?;
            state.graph.write().delete_stream(identity, &id)?;
            state.objects.remove(&id).await?;
            info!(stream = %id, "deleted stream");
            json!({ "streamDelete": true })
        }
        "StreamGrantPermission" => {
            let input: StreamPermissionInput = vars.get("input")?;
            let user = state
                .auth
                .find_user(&input.user_id)
                .ok_or_else(|| ServerError::UserNotFound(input.user_id.clone()))?;
            state
                .graph
                .write()
                .grant_permission(identity, &input.stream_id, &user, input.role)?;
            json!({ "streamGrantPermission": true })
        }
        "StreamRevokePermission" => {
            let input: StreamRevokePermissionInput = vars.get("input")?;
            state
                .graph
                .write()
                .revoke_permission(identity, &input.stream_id, &input.user_id)?;
            json!({ "streamRevokePermission": true })
        }

        "BranchCreate" => {
            let input: BranchCreateInput = vars.get("input")?;
            let id = state.graph.write().create_branch(identity, &input)?;
            json!({ "branchCreate": id })
        }
        "BranchGet" => {
            let branch = state.graph.read().get_branch(
                identity,
                &vars.get::<String>("streamId")?,
                &vars.get::<String>("name")?,
                vars.limit("commitLimit")?,
            )?;
            json!({ "stream": { "branch": branch } })
        }
        "BranchList" => {
            let page = state.graph.read().list_branches(
                identity,
                &vars.get::<String>("streamId")?,
                vars.limit("limit")?,
                vars.opt::<String>("cursor")?.as_deref(),
            )?;
            json!({ "stream": { "branches": page } })
        }
        "BranchUpdate" => {
            let input: BranchUpdateInput = vars.get("input")?;
            state.graph.write().update_branch(identity, &input)?;
            json!({ "branchUpdate": true })
        }
        "BranchDelete" => {
            let input: BranchDeleteInput = vars.get("input")?;
            state.graph.write().delete_branch(identity, &input)?;
            json!({ "branchDelete": true })
        }

        "CommitCreate" => {
            let input: CommitCreateInput = vars.get("input")?;
            state
                .graph
                .read()
                .authorize(identity, &input.stream_id, StreamRole::Contributor)?;
            let header = state.objects.header(&input.stream_id, &input.object_id).await?;
            let total_children_count = match (&header, input.total_children_count) {
                (Some(header), 0) => header.total_children_count,
                (_, given) => given,
            };
            let event = state
                .graph
                .write()
                .create_commit(identity, &input, header.is_some(), total_children_count)?;
            info!(
                stream = %event.stream_id,
                commit = %event.commit.id,
                branch = %event.commit.branch_name,
                object = %event.commit.referenced_object,
                "created commit"
            );
            let id = event.commit.id.clone();
            state.events.publish(ServerEvent::CommitCreated(event));
            json!({ "commitCreate": id })
        }
        "CommitGet" => {
            let commit = state.graph.read().get_commit(
                identity,
                &vars.get::<String>("streamId")?,
                &vars.get::<String>("id")?,
            )?;
            json!({ "stream": { "commit": commit } })
        }
        "CommitList" => {
            let page = state.graph.read().list_commits(
                identity,
                &vars.get::<String>("streamId")?,
                vars.limit("limit")?,
                vars.opt::<String>("cursor")?.as_deref(),
            )?;
            json!({ "stream": { "commits": page } })
        }
        "CommitUpdate" => {
            let input: CommitUpdateInput = vars.get("input")?;
            state.graph.write().update_commit(identity, &input)?;
            json!({ "commitUpdate": true })
        }
        "CommitDelete" => {
            let input: CommitDeleteInput = vars.get("input")?;
            state.graph.write().delete_commit(identity, &input)?;
            json!({ "commitDelete": true })
        }
        "CommitReceive" => {
            let input: CommitReceivedInput = vars.get("input")?;
            state
                .graph
                .read()
                .commit_received(identity, &input.stream_id, &input.commit_id)?;
            info!(
                stream = %input.stream_id,
                commit = %input.commit_id,
                source = input.source_application.as_deref().unwrap_or("unknown"),
                "commit received"
            );
            json!({ "commitReceive": true })
        }

        other => return Err(Unknown(other.to_string())),
    };
    Ok(data)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Topic {
    StreamUpdated,
    CommitCreated,
}

impl Topic {
    fn from_operation(operation: &str) -> ServerResult<Self> {
        match operation {
            "StreamUpdated" => Ok(Self::StreamUpdated),
            "CommitCreated" => Ok(Self::CommitCreated),
            other => Err(ServerError::BadInput(format!("unknown subscription '{other}'"))),
        }
    }

    /// The `data:` payload for `event`, if it belongs to this topic.
    fn payload(self, event: &ServerEvent) -> Option<String> {
        let data = match (self, event) {
            (Self::StreamUpdated, ServerEvent::StreamUpdated(e)) => json!({ "data": { "streamUpdated": e } }),
            (Self::CommitCreated, ServerEvent::CommitCreated(e)) => json!({ "data": { "commitCreated": e } }),
            _ => return None,
        };
        Some(data.to_string())
    }
}

/// `POST /graphql/stream`: one subscription per request, delivered as
/// `event: next` frames until the client hangs up.
pub async fn graphql_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GraphQlRequest>,
) -> ServerResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let topic = Topic::from_operation(request.operation_name.as_deref().unwrap_or_default())?;
    let stream_id: String = Variables(request.variables).get("streamId")?;
    let identity = state.identify(&headers).await?;
    state
        .graph
        .read()
        .authorize(&identity, &stream_id, StreamRole::Reviewer)?;

    debug!(stream = %stream_id, ?topic, "subscription opened");
    let receiver = state.events.subscribe();
    let events = stream::unfold((receiver, stream_id), move |(mut receiver, stream_id)| async move {
        loop {
            match receiver.recv().await {
                Ok(event) if event.stream_id() == stream_id => {
                    if let Some(payload) = topic.payload(&event) {
                        let frame = Event::default().event("next").data(payload);
                        return Some((Ok(frame), (receiver, stream_id)));
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!(stream = %stream_id, missed, "subscriber fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

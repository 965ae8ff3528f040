use serde_json::json;

use crate::client::Client;
use crate::error::ApiResult;
use crate::models::{
    Commit, CommitCreateInput, CommitDeleteInput, CommitReceivedInput, CommitUpdateInput, Page,
};
use crate::queries;

impl Client {
    /// Record a commit pointing at an object the stream already holds.
    /// Returns the new commit id.
    pub async fn commit_create(&self, input: &CommitCreateInput) -> ApiResult<String> {
        self.execute_at(queries::COMMIT_CREATE, json!({ "input": input }), &["commitCreate"])
            .await
    }

    pub async fn commit_get(&self, stream_id: &str, id: &str) -> ApiResult<Commit> {
        self.execute_at(
            queries::COMMIT_GET,
            json!({ "streamId": stream_id, "id": id }),
            &["stream", "commit"],
        )
        .await
    }

    /// Commits across all branches of a stream, newest first.
    pub async fn commit_list(&self, stream_id: &str, limit: usize, cursor: Option<&str>) -> ApiResult<Page<Commit>> {
        self.execute_at(
            queries::COMMIT_LIST,
            json!({ "streamId": stream_id, "limit": limit, "cursor": cursor }),
            &["stream", "commits"],
        )
        .await
    }

    /// Only the message of a commit can change.
    pub async fn commit_update(&self, input: &CommitUpdateInput) -> ApiResult<bool> {
        self.execute_at(queries::COMMIT_UPDATE, json!({ "input": input }), &["commitUpdate"])
            .await
    }

    pub async fn commit_delete(&self, input: &CommitDeleteInput) -> ApiResult<bool> {
        self.execute_at(queries::COMMIT_DELETE, json!({ "input": input }), &["commitDelete"])
            .await
    }

    /// Tell the server a commit was received, for activity tracking.
    pub async fn commit_received(&self, input: &CommitReceivedInput) -> ApiResult<bool> {
        self.execute_at(queries::COMMIT_RECEIVED, json!({ "input": input }), &["commitReceive"])
            .await
    }
}

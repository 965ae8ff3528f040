use serde_json::json;

use crate::client::Client;
use crate::error::ApiResult;
use crate::models::{
    Page, Stream, StreamCreateInput, StreamPermissionInput, StreamRevokePermissionInput,
    StreamUpdateInput, User,
};
use crate::queries;

impl Client {
    /// The user the account's token belongs to.
    pub async fn active_user(&self) -> ApiResult<User> {
        self.execute_at(queries::ACTIVE_USER, json!({}), &["activeUser"])
            .await
    }

    /// A stream with its first branches, each with its latest commits.
    pub async fn stream_get(&self, id: &str, branch_limit: usize, commit_limit: usize) -> ApiResult<Stream> {
        self.execute_at(
            queries::STREAM_GET,
            json!({ "id": id, "branchLimit": branch_limit, "commitLimit": commit_limit }),
            &["stream"],
        )
        .await
    }

    /// Streams the caller collaborates on, newest first.
    pub async fn stream_list(&self, limit: usize, cursor: Option<&str>) -> ApiResult<Page<Stream>> {
        self.execute_at(
            queries::STREAM_LIST,
            json!({ "limit": limit, "cursor": cursor }),
            &["streams"],
        )
        .await
    }

    /// Streams whose name or description contains `query`, case-insensitively.
    pub async fn stream_search(&self, query: &str, limit: usize, cursor: Option<&str>) -> ApiResult<Page<Stream>> {
        self.execute_at(
            queries::STREAM_SEARCH,
            json!({ "query": query, "limit": limit, "cursor": cursor }),
            &["streams"],
        )
        .await
    }

    /// Create a stream and its default branch. Returns the new stream id.
    pub async fn stream_create(&self, input: &StreamCreateInput) -> ApiResult<String> {
        self.execute_at(queries::STREAM_CREATE, json!({ "input": input }), &["streamCreate"])
            .await
    }

    pub async fn stream_update(&self, input: &StreamUpdateInput) -> ApiResult<bool> {
        self.execute_at(queries::STREAM_UPDATE, json!({ "input": input }), &["streamUpdate"])
            .await
    }

    /// Delete a stream with all of its branches, commits and objects.
    pub async fn stream_delete(&self, id: &str) -> ApiResult<bool> {
        self.execute_at(queries::STREAM_DELETE, json!({ "id": id }), &["streamDelete"])
            .await
    }

    /// Give a user a role on a stream, replacing any role they had.
    pub async fn stream_grant_permission(&self, input: &StreamPermissionInput) -> ApiResult<bool> {
        self.execute_at(
            queries::STREAM_GRANT_PERMISSION,
            json!({ "input": input }),
            &["streamGrantPermission"],
        )
        .await
    }

    pub async fn stream_revoke_permission(&self, input: &StreamRevokePermissionInput) -> ApiResult<bool> {
        self.execute_at(
            queries::STREAM_REVOKE_PERMISSION,
            json!({ "input": input }),
            &["streamRevokePermission"],
        )
        .await
    }
}

use serde_json::json;

use crate::client::Client;
use crate::error::ApiResult;
use crate::models::{Branch, BranchCreateInput, BranchDeleteInput, BranchUpdateInput, Page};
use crate::queries;

impl Client {
    /// Returns the new branch id.
    pub async fn branch_create(&self, input: &BranchCreateInput) -> ApiResult<String> {
        self.execute_at(queries::BRANCH_CREATE, json!({ "input": input }), &["branchCreate"])
            .await
    }

    /// A branch by name, with its latest `commit_limit` commits.
    pub async fn branch_get(&self, stream_id: &str, name: &str, commit_limit: usize) -> ApiResult<Branch> {
        self.execute_at(
            queries::BRANCH_GET,
            json!({ "streamId": stream_id, "name": name, "commitLimit": commit_limit }),
            &["stream", "branch"],
        )
        .await
    }

    pub async fn branch_list(&self, stream_id: &str, limit: usize, cursor: Option<&str>) -> ApiResult<Page<Branch>> {
        self.execute_at(
            queries::BRANCH_LIST,
            json!({ "streamId": stream_id, "limit": limit, "cursor": cursor }),
            &["stream", "branches"],
        )
        .await
    }

    pub async fn branch_update(&self, input: &BranchUpdateInput) -> ApiResult<bool> {
        self.execute_at(queries::BRANCH_UPDATE, json!({ "input": input }), &["branchUpdate"])
            .await
    }

    /// Fails for the default branch.
    pub async fn branch_delete(&self, input: &BranchDeleteInput) -> ApiResult<bool> {
        self.execute_at(queries::BRANCH_DELETE, json!({ "input": input }), &["branchDelete"])
            .await
    }
}

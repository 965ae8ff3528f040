//! Version graph entities and mutation inputs, in their wire shape.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use speckle_types::ObjectId;

/// Name of the branch every stream is created with.
pub const DEFAULT_BRANCH: &str = "main";

/// Access level of a user on a stream. Ordered by privilege.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StreamRole {
    #[serde(rename = "stream:reviewer")]
    Reviewer,
    #[serde(rename = "stream:contributor")]
    Contributor,
    #[serde(rename = "stream:owner")]
    Owner,
}

impl StreamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reviewer => "stream:reviewer",
            Self::Contributor => "stream:contributor",
            Self::Owner => "stream:owner",
        }
    }
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stream:reviewer" | "reviewer" => Ok(Self::Reviewer),
            "stream:contributor" | "contributor" => Ok(Self::Contributor),
            "stream:owner" | "owner" => Ok(Self::Owner),
            other => Err(format!("unknown stream role '{other}'")),
        }
    }
}

/// One page of a cursor-paginated list. Pass `cursor` back to get the next page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub total_count: usize,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            total_count: 0,
            cursor: None,
            items: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub id: String,
    pub name: String,
    pub role: StreamRole,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub is_public: bool,
    /// The caller's role, absent for anonymous readers of public streams.
    #[serde(default)]
    pub role: Option<StreamRole>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub collaborators: Vec<Collaborator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Page<Branch>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commits: Option<Page<Commit>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub id: String,
    pub message: String,
    pub branch_name: String,
    pub author_id: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub source_application: Option<String>,
    pub referenced_object: ObjectId,
    #[serde(default)]
    pub total_children_count: u64,
    #[serde(default)]
    pub parents: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamCreateInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamUpdateInput {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamPermissionInput {
    pub stream_id: String,
    pub user_id: String,
    pub role: StreamRole,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRevokePermissionInput {
    pub stream_id: String,
    pub user_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchCreateInput {
    pub stream_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchUpdateInput {
    pub stream_id: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchDeleteInput {
    pub stream_id: String,
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitCreateInput {
    pub stream_id: String,
    pub branch_name: String,
    pub object_id: ObjectId,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub source_application: Option<String>,
    #[serde(default)]
    pub total_children_count: u64,
    #[serde(default)]
    pub parents: Vec<String>,
}

impl CommitCreateInput {
    pub fn new(stream_id: impl Into<String>, branch_name: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            stream_id: stream_id.into(),
            branch_name: branch_name.into(),
            object_id,
            message: String::new(),
            source_application: None,
            total_children_count: 0,
            parents: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitUpdateInput {
    pub stream_id: String,
    pub id: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitDeleteInput {
    pub stream_id: String,
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReceivedInput {
    pub stream_id: String,
    pub commit_id: String,
    #[serde(default)]
    pub source_application: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Pushed when a stream's metadata changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamUpdatedEvent {
    pub stream_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

/// Pushed when a commit lands on any branch of a stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitCreatedEvent {
    pub stream_id: String,
    pub commit: Commit,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn roles_use_prefixed_names_and_order_by_privilege() {
        assert_eq!(serde_json::to_value(StreamRole::Owner).unwrap(), json!("stream:owner"));
        assert_eq!("contributor".parse::<StreamRole>().unwrap(), StreamRole::Contributor);
        assert!(StreamRole::Owner > StreamRole::Contributor);
        assert!(StreamRole::Contributor > StreamRole::Reviewer);
        assert!("admin".parse::<StreamRole>().is_err());
    }

    #[test]
    fn commit_input_is_camel_case() {
        let id = ObjectId::from_hash([7; 32]);
        let input = CommitCreateInput::new("s1", DEFAULT_BRANCH, id).with_message("first");
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["streamId"], "s1");
        assert_eq!(value["branchName"], "main");
        assert_eq!(value["objectId"], id.to_hex());
    }

    #[test]
    fn nested_stream_pages_parse() {
        let id = ObjectId::from_hash([1; 32]);
        let value = json!({
            "id": "s1", "name": "demo", "isPublic": false,
            "createdAt": "2024-01-01T00:00:00Z", "updatedAt": "2024-01-02T00:00:00Z",
            "branches": {"totalCount": 1, "cursor": null, "items": [{
                "id": "b1", "name": "main",
                "commits": {"totalCount": 1, "items": [{
                    "id": "c1", "message": "m", "branchName": "main",
                    "authorId": "u1", "authorName": "Ada",
                    "createdAt": "2024-01-02T00:00:00Z",
                    "referencedObject": id.to_hex()
                }]}
            }]}
        });
        let stream: Stream = serde_json::from_value(value).unwrap();
        let branches = stream.branches.unwrap();
        let commits = branches.items[0].commits.as_ref().unwrap();
        assert_eq!(commits.items[0].referenced_object, id);
        assert!(stream.role.is_none());
        assert!(stream.collaborators.is_empty());
    }
}

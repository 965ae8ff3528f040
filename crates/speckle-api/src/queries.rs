//! GraphQL documents sent by the client, keyed by operation name.
//!
//! Servers dispatch on `operationName`; the documents keep the selection
//! sets explicit so any GraphQL server with the same schema can answer.

pub const ACTIVE_USER: (&str, &str) = (
    "ActiveUser",
    "query ActiveUser { activeUser { id name email } }",
);

pub const STREAM_GET: (&str, &str) = (
    "StreamGet",
    r#"query StreamGet($id: String!, $branchLimit: Int!, $commitLimit: Int!) {
  stream(id: $id) {
    id name description isPublic role createdAt updatedAt
    collaborators { id name role }
    branches(limit: $branchLimit) {
      totalCount cursor
      items {
        id name description
        commits(limit: $commitLimit) {
          totalCount cursor
          items { id message branchName authorId authorName createdAt sourceApplication referencedObject totalChildrenCount parents }
        }
      }
    }
  }
}"#,
);

pub const STREAM_LIST: (&str, &str) = (
    "StreamList",
    r#"query StreamList($limit: Int!, $cursor: String) {
  streams(limit: $limit, cursor: $cursor) {
    totalCount cursor
    items { id name description isPublic role createdAt updatedAt collaborators { id name role } }
  }
}"#,
);

pub const STREAM_SEARCH: (&str, &str) = (
    "StreamSearch",
    r#"query StreamSearch($query: String!, $limit: Int!, $cursor: String) {
  streams(query: $query, limit: $limit, cursor: $cursor) {
    totalCount cursor
    items { id name description isPublic role createdAt updatedAt collaborators { id name role } }
  }
}"#,
);

pub const STREAM_CREATE: (&str, &str) = (
    "StreamCreate",
    "mutation StreamCreate($input: StreamCreateInput!) { streamCreate(stream: $input) }",
);

pub const STREAM_UPDATE: (&str, &str) = (
    "StreamUpdate",
    "mutation StreamUpdate($input: StreamUpdateInput!) { streamUpdate(stream: $input) }",
);

pub const STREAM_DELETE: (&str, &str) = (
    "StreamDelete",
    "mutation StreamDelete($id: String!) { streamDelete(id: $id) }",
);

pub const STREAM_GRANT_PERMISSION: (&str, &str) = (
    "StreamGrantPermission",
    "mutation StreamGrantPermission($input: StreamPermissionInput!) { streamGrantPermission(permissionParams: $input) }",
);

pub const STREAM_REVOKE_PERMISSION: (&str, &str) = (
    "StreamRevokePermission",
    "mutation StreamRevokePermission($input: StreamRevokePermissionInput!) { streamRevokePermission(permissionParams: $input) }",
);

pub const BRANCH_CREATE: (&str, &str) = (
    "BranchCreate",
    "mutation BranchCreate($input: BranchCreateInput!) { branchCreate(branch: $input) }",
);

pub const BRANCH_GET: (&str, &str) = (
    "BranchGet",
    r#"query BranchGet($streamId: String!, $name: String!, $commitLimit: Int!) {
  stream(id: $streamId) {
    branch(name: $name) {
      id name description
      commits(limit: $commitLimit) {
        totalCount cursor
        items { id message branchName authorId authorName createdAt sourceApplication referencedObject totalChildrenCount parents }
      }
    }
  }
}"#,
);

pub const BRANCH_LIST: (&str, &str) = (
    "BranchList",
    r#"query BranchList($streamId: String!, $limit: Int!, $cursor: String) {
  stream(id: $streamId) {
    branches(limit: $limit, cursor: $cursor) {
      totalCount cursor
      items { id name description }
    }
  }
}"#,
);

pub const BRANCH_UPDATE: (&str, &str) = (
    "BranchUpdate",
    "mutation BranchUpdate($input: BranchUpdateInput!) { branchUpdate(branch: $input) }",
);

pub const BRANCH_DELETE: (&str, &str) = (
    "BranchDelete",
    "mutation BranchDelete($input: BranchDeleteInput!) { branchDelete(branch: $input) }",
);

pub const COMMIT_CREATE: (&str, &str) = (
    "CommitCreate",
    "mutation CommitCreate($input: CommitCreateInput!) { commitCreate(commit: $input) }",
);

pub const COMMIT_GET: (&str, &str) = (
    "CommitGet",
    r#"query CommitGet($streamId: String!, $id: String!) {
  stream(id: $streamId) {
    commit(id: $id) { id message branchName authorId authorName createdAt sourceApplication referencedObject totalChildrenCount parents }
  }
}"#,
);

pub const COMMIT_LIST: (&str, &str) = (
    "CommitList",
    r#"query CommitList($streamId: String!, $limit: Int!, $cursor: String) {
  stream(id: $streamId) {
    commits(limit: $limit, cursor: $cursor) {
      totalCount cursor
      items { id message branchName authorId authorName createdAt sourceApplication referencedObject totalChildrenCount parents }
    }
  }
}"#,
);

pub const COMMIT_UPDATE: (&str, &str) = (
    "CommitUpdate",
    "mutation CommitUpdate($input: CommitUpdateInput!) { commitUpdate(commit: $input) }",
);

pub const COMMIT_DELETE: (&str, &str) = (
    "CommitDelete",
    "mutation CommitDelete($input: CommitDeleteInput!) { commitDelete(commit: $input) }",
);

pub const COMMIT_RECEIVED: (&str, &str) = (
    "CommitReceive",
    "mutation CommitReceive($input: CommitReceivedInput!) { commitReceive(input: $input) }",
);

pub const STREAM_UPDATED: (&str, &str) = (
    "StreamUpdated",
    "subscription StreamUpdated($streamId: String!) { streamUpdated(streamId: $streamId) }",
);

pub const COMMIT_CREATED: (&str, &str) = (
    "CommitCreated",
    "subscription CommitCreated($streamId: String!) { commitCreated(streamId: $streamId) }",
);

//! In-memory version graph: streams, their branches and commits, and who may
//! touch them.
//!
//! Methods take the caller's [`Identity`] and enforce roles themselves:
//! reviewers (or anyone, on public streams) read, contributors write,
//! owners administer. Mutations that subscribers care about return the
//! event to publish; publishing is the caller's job.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use speckle_api::{
    Branch, BranchCreateInput, BranchDeleteInput, BranchUpdateInput, Collaborator, Commit,
    CommitCreateInput, CommitCreatedEvent, CommitDeleteInput, CommitUpdateInput, Page, Stream,
    StreamCreateInput, StreamRole, StreamUpdateInput, StreamUpdatedEvent, User, DEFAULT_BRANCH,
};

use crate::auth::Identity;
use crate::error::{ServerError, ServerResult};

/// Bounds applied to every requested page size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageLimits {
    pub default: usize,
    pub max: usize,
}

impl PageLimits {
    pub fn clamp(&self, requested: usize) -> usize {
        if requested == 0 {
            self.default.min(self.max)
        } else {
            requested.min(self.max)
        }
    }
}

#[derive(Clone, Debug)]
struct StreamRecord {
    seq: u64,
    id: String,
    name: String,
    description: Option<String>,
    is_public: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    collaborators: BTreeMap<String, Collaborator>,
    branches: Vec<BranchRecord>,
    commits: Vec<CommitRecord>,
}

#[derive(Clone, Debug)]
struct BranchRecord {
    seq: u64,
    id: String,
    name: String,
    description: Option<String>,
}

#[derive(Clone, Debug)]
struct CommitRecord {
    seq: u64,
    commit: Commit,
}

impl StreamRecord {
    fn role_of(&self, identity: &Identity) -> Option<StreamRole> {
        let user_id = identity.user_id()?;
        self.collaborators.get(user_id).map(|c| c.role)
    }

    /// Fails unless `identity` holds at least `needed` on this stream.
    /// Public streams are readable by anyone.
    fn require(&self, identity: &Identity, needed: StreamRole) -> ServerResult<()> {
        if needed == StreamRole::Reviewer && self.is_public {
            return Ok(());
        }
        identity.user()?;
        match self.role_of(identity) {
            Some(role) if role >= needed => Ok(()),
            _ => Err(ServerError::Forbidden {
                stream: self.id.clone(),
                action: action_name(needed).to_string(),
            }),
        }
    }

    fn branch(&self, name: &str) -> ServerResult<&BranchRecord> {
        self.branches
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| ServerError::BranchNotFound {
                stream: self.id.clone(),
                branch: name.to_string(),
            })
    }

    fn branch_by_id(&mut self, id: &str) -> ServerResult<&mut BranchRecord> {
        let stream = self.id.clone();
        self.branches
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(ServerError::BranchNotFound { stream, branch: id.to_string() })
    }

    fn commit_mut(&mut self, id: &str) -> ServerResult<&mut CommitRecord> {
        let stream = self.id.clone();
        self.commits
            .iter_mut()
            .find(|c| c.commit.id == id)
            .ok_or(ServerError::CommitNotFound { stream, commit: id.to_string() })
    }

    fn commit_page(&self, branch: Option<&str>, limit: usize, cursor: Option<&str>) -> ServerResult<Page<Commit>> {
        let items = self
            .commits
            .iter()
            .filter(|c| branch.map_or(true, |name| c.commit.branch_name == name))
            .map(|c| (c.seq, c.commit.clone()))
            .collect();
        paginate(items, Order::NewestFirst, cursor, limit)
    }

    fn view(&self, identity: &Identity, branches: Option<Page<Branch>>) -> Stream {
        Stream {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            is_public: self.is_public,
            role: self.role_of(identity),
            created_at: self.created_at,
            updated_at: self.updated_at,
            collaborators: self.collaborators.values().cloned().collect(),
            branches,
        }
    }
}

fn action_name(role: StreamRole) -> &'static str {
    match role {
        StreamRole::Reviewer => "read",
        StreamRole::Contributor => "write",
        StreamRole::Owner => "administer",
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Order {
    OldestFirst,
    NewestFirst,
}

/// Cursor pagination over `(seq, item)` pairs. The cursor is the `seq` of
/// the last item handed out, so pages stay stable while items are added.
fn paginate<T>(mut items: Vec<(u64, T)>, order: Order, cursor: Option<&str>, limit: usize) -> ServerResult<Page<T>> {
    match order {
        Order::OldestFirst => items.sort_by_key(|(seq, _)| *seq),
        Order::NewestFirst => items.sort_by_key(|(seq, _)| Reverse(*seq)),
    }
    let total_count = items.len();
    if let Some(cursor) = cursor {
        let after: u64 = cursor
            .parse()
            .map_err(|_| ServerError::BadInput(format!("invalid cursor '{cursor}'")))?;
        items.retain(|(seq, _)| match order {
            Order::OldestFirst => *seq > after,
            Order::NewestFirst => *seq < after,
        });
    }
    let has_more = items.len() > limit;
    items.truncate(limit);
    let cursor = if has_more {
        items.last().map(|(seq, _)| seq.to_string())
    } else {
        None
    };
    Ok(Page {
        total_count,
        cursor,
        items: items.into_iter().map(|(_, item)| item).collect(),
    })
}

fn new_id() -> String {
    hex::encode(rand::random::<[u8; 5]>())
}

/// Draw ids from `next` until one is not `taken`.
fn unused_id(mut next: impl FnMut() -> String, taken: impl Fn(&str) -> bool) -> String {
    loop {
        let id = next();
        if !taken(&id) {
            return id;
        }
    }
}

fn non_empty(value: &str, what: &str) -> ServerResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServerError::BadInput(format!("{what} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Streams, branches, commits and roles.
#[derive(Debug)]
pub struct VersionGraph {
    streams: HashMap<String, StreamRecord>,
    next_seq: u64,
    limits: PageLimits,
}

impl VersionGraph {
    pub fn new(limits: PageLimits) -> Self {
        Self {
            streams: HashMap::new(),
            next_seq: 1,
            limits,
        }
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn contains_stream(&self, id: &str) -> bool {
        self.streams.contains_key(id)
    }

    fn seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn stream(&self, id: &str) -> ServerResult<&StreamRecord> {
        self.streams
            .get(id)
            .ok_or_else(|| ServerError::StreamNotFound(id.to_string()))
    }

    fn stream_mut(&mut self, id: &str) -> ServerResult<&mut StreamRecord> {
        self.streams
            .get_mut(id)
            .ok_or_else(|| ServerError::StreamNotFound(id.to_string()))
    }

    /// Fails unless `identity` may act on `stream_id` with `role`.
    pub fn authorize(&self, identity: &Identity, stream_id: &str, role: StreamRole) -> ServerResult<()> {
        self.stream(stream_id)?.require(identity, role)
    }

    // Streams

    /// Create a stream owned by the caller, with its default branch.
    pub fn create_stream(&mut self, identity: &Identity, input: &StreamCreateInput) -> ServerResult<String> {
        let user = identity.user()?.clone();
        let name = non_empty(&input.name, "stream name")?;
        let now = Utc::now();
        let id = unused_id(new_id, |id| self.streams.contains_key(id));
        let seq = self.seq();
        let branch_seq = self.seq();
        let owner = Collaborator {
            id: user.id.clone(),
            name: user.name.clone(),
            role: StreamRole::Owner,
        };
        self.streams.insert(
            id.clone(),
            StreamRecord {
                seq,
                id: id.clone(),
                name,
                description: input.description.clone(),
                is_public: input.is_public,
                created_at: now,
                updated_at: now,
                collaborators: BTreeMap::from([(user.id, owner)]),
                branches: vec![BranchRecord {
                    seq: branch_seq,
                    id: new_id(),
                    name: DEFAULT_BRANCH.to_string(),
                    description: Some("default branch".to_string()),
                }],
                commits: Vec::new(),
            },
        );
        Ok(id)
    }

    pub fn update_stream(&mut self, identity: &Identity, input: &StreamUpdateInput) -> ServerResult<StreamUpdatedEvent> {
        let stream = self.stream_mut(&input.id)?;
        stream.require(identity, StreamRole::Owner)?;
        if let Some(name) = &input.name {
            stream.name = non_empty(name, "stream name")?;
        }
        if let Some(description) = &input.description {
            stream.description = Some(description.clone());
        }
        if let Some(is_public) = input.is_public {
            stream.is_public = is_public;
        }
        stream.updated_at = Utc::now();
        Ok(StreamUpdatedEvent {
            stream_id: stream.id.clone(),
            name: input.name.clone(),
            description: input.description.clone(),
            is_public: input.is_public,
        })
    }

    pub fn delete_stream(&mut self, identity: &Identity, id: &str) -> ServerResult<()> {
        self.stream(id)?.require(identity, StreamRole::Owner)?;
        self.streams.remove(id);
        Ok(())
    }

    pub fn get_stream(&self, identity: &Identity, id: &str, branch_limit: usize, commit_limit: usize) -> ServerResult<Stream> {
        let stream = self.stream(id)?;
        stream.require(identity, StreamRole::Reviewer)?;
        let commit_limit = self.limits.clamp(commit_limit);
        let branches = stream
            .branches
            .iter()
            .map(|b| -> ServerResult<(u64, Branch)> {
                let branch = Branch {
                    id: b.id.clone(),
                    name: b.name.clone(),
                    description: b.description.clone(),
                    commits: Some(stream.commit_page(Some(&b.name), commit_limit, None)?),
                };
                Ok((b.seq, branch))
            })
            .collect::<ServerResult<Vec<_>>>()?;
        let page = paginate(branches, Order::OldestFirst, None, self.limits.clamp(branch_limit))?;
        Ok(stream.view(identity, Some(page)))
    }

    /// Streams the caller collaborates on, or with `query`, every readable
    /// stream whose name or description matches. Newest first.
    pub fn list_streams(
        &self,
        identity: &Identity,
        query: Option<&str>,
        limit: usize,
        cursor: Option<&str>,
    ) -> ServerResult<Page<Stream>> {
        let needle = query.map(str::to_lowercase);
        if needle.is_none() {
            identity.user()?;
        }
        let items = self
            .streams
            .values()
            .filter(|s| match &needle {
                None => s.role_of(identity).is_some(),
                Some(needle) => {
                    s.require(identity, StreamRole::Reviewer).is_ok()
                        && (s.name.to_lowercase().contains(needle.as_str())
                            || s
                                .description
                                .as_deref()
                                .is_some_and(|d| d.to_lowercase().contains(needle.as_str())))
                }
            })
            .map(|s| (s.seq, s.view(identity, None)))
            .collect();
        paginate(items, Order::NewestFirst, cursor, self.limits.clamp(limit))
    }

    pub fn grant_permission(&mut self, identity: &Identity, stream_id: &str, user: &User, role: StreamRole) -> ServerResult<()> {
        let stream = self.stream_mut(stream_id)?;
        stream.require(identity, StreamRole::Owner)?;
        stream.collaborators.insert(
            user.id.clone(),
            Collaborator {
                id: user.id.clone(),
                name: user.name.clone(),
                role,
            },
        );
        if stream.collaborators.values().all(|c| c.role != StreamRole::Owner) {
            // Demoting the last owner would orphan the stream.
            stream.collaborators.insert(
                user.id.clone(),
                Collaborator {
                    id: user.id.clone(),
                    name: user.name.clone(),
                    role: StreamRole::Owner,
                },
            );
            return Err(ServerError::BadInput("a stream needs at least one owner".into()));
        }
        stream.updated_at = Utc::now();
        Ok(())
    }

    pub fn revoke_permission(&mut self, identity: &Identity, stream_id: &str, user_id: &str) -> ServerResult<()> {
        let stream = self.stream_mut(stream_id)?;
        stream.require(identity, StreamRole::Owner)?;
        let Some(existing) = stream.collaborators.get(user_id) else {
            return Err(ServerError::UserNotFound(user_id.to_string()));
        };
        let owners = stream
            .collaborators
            .values()
            .filter(|c| c.role == StreamRole::Owner)
            .count();
        if existing.role == StreamRole::Owner && owners == 1 {
            return Err(ServerError::BadInput("a stream needs at least one owner".into()));
        }
        stream.collaborators.remove(user_id);
        stream.updated_at = Utc::now();
        Ok(())
    }

    // Branches

    pub fn create_branch(&mut self, identity: &Identity, input: &BranchCreateInput) -> ServerResult<String> {
        let seq = self.seq();
        let stream = self.stream_mut(&input.stream_id)?;
        stream.require(identity, StreamRole::Contributor)?;
        let name = non_empty(&input.name, "branch name")?.to_lowercase();
        if stream.branches.iter().any(|b| b.name == name) {
            return Err(ServerError::Conflict(format!("branch '{name}' already exists")));
        }
        let id = unused_id(new_id, |id| stream.branches.iter().any(|b| b.id == id));
        stream.branches.push(BranchRecord {
            seq,
            id: id.clone(),
            name,
            description: input.description.clone(),
        });
        Ok(id)
    }

    pub fn get_branch(&self, identity: &Identity, stream_id: &str, name: &str, commit_limit: usize) -> ServerResult<Branch> {
        let stream = self.stream(stream_id)?;
        stream.require(identity, StreamRole::Reviewer)?;
        let branch = stream.branch(name)?;
        Ok(Branch {
            id: branch.id.clone(),
            name: branch.name.clone(),
            description: branch.description.clone(),
            commits: Some(stream.commit_page(Some(name), self.limits.clamp(commit_limit), None)?),
        })
    }

    /// Branches in creation order, the default branch first.
    pub fn list_branches(&self, identity: &Identity, stream_id: &str, limit: usize, cursor: Option<&str>) -> ServerResult<Page<Branch>> {
        let stream = self.stream(stream_id)?;
        stream.require(identity, StreamRole::Reviewer)?;
        let items = stream
            .branches
            .iter()
            .map(|b| {
                let branch = Branch {
                    id: b.id.clone(),
                    name: b.name.clone(),
                    description: b.description.clone(),
                    commits: None,
                };
                (b.seq, branch)
            })
            .collect();
        paginate(items, Order::OldestFirst, cursor, self.limits.clamp(limit))
    }

    pub fn update_branch(&mut self, identity: &Identity, input: &BranchUpdateInput) -> ServerResult<()> {
        let stream = self.stream_mut(&input.stream_id)?;
        stream.require(identity, StreamRole::Contributor)?;
        let new_name = match &input.name {
            Some(name) => Some(non_empty(name, "branch name")?.to_lowercase()),
            None => None,
        };
        if let Some(name) = &new_name {
            if stream.branches.iter().any(|b| &b.name == name && b.id != input.id) {
                return Err(ServerError::Conflict(format!("branch '{name}' already exists")));
            }
        }
        let branch = stream.branch_by_id(&input.id)?;
        let old_name = branch.name.clone();
        if old_name == DEFAULT_BRANCH && new_name.as_deref().is_some_and(|n| n != DEFAULT_BRANCH) {
            return Err(ServerError::BadInput("the default branch cannot be renamed".into()));
        }
        if let Some(description) = &input.description {
            branch.description = Some(description.clone());
        }
        if let Some(name) = new_name {
            branch.name = name.clone();
            for record in stream.commits.iter_mut().filter(|c| c.commit.branch_name == old_name) {
                record.commit.branch_name = name.clone();
            }
        }
        Ok(())
    }

    /// Delete a branch and the commits on it. The default branch stays.
    pub fn delete_branch(&mut self, identity: &Identity, input: &BranchDeleteInput) -> ServerResult<()> {
        let stream = self.stream_mut(&input.stream_id)?;
        stream.require(identity, StreamRole::Contributor)?;
        let name = stream.branch_by_id(&input.id)?.name.clone();
        if name == DEFAULT_BRANCH {
            return Err(ServerError::BadInput("the default branch cannot be deleted".into()));
        }
        stream.branches.retain(|b| b.id != input.id);
        stream.commits.retain(|c| c.commit.branch_name != name);
        Ok(())
    }

    // Commits

    /// Append a commit. `object_known` says whether the stream's object
    /// store holds `input.object_id`; commits may only point at stored data.
    pub fn create_commit(
        &mut self,
        identity: &Identity,
        input: &CommitCreateInput,
        object_known: bool,
        total_children_count: u64,
    ) -> ServerResult<CommitCreatedEvent> {
        let seq = self.seq();
        let stream = self.stream_mut(&input.stream_id)?;
        stream.require(identity, StreamRole::Contributor)?;
        let branch_name = stream.branch(&input.branch_name.to_lowercase())?.name.clone();
        if !object_known {
            return Err(ServerError::BadInput(format!(
                "object {} is not stored in stream {}",
                input.object_id, stream.id
            )));
        }
        let author = identity.user()?;
        let commit = Commit {
            id: unused_id(new_id, |id| stream.commits.iter().any(|c| c.commit.id == id)),
            message: input.message.clone(),
            branch_name,
            author_id: author.id.clone(),
            author_name: author.name.clone(),
            created_at: Utc::now(),
            source_application: input.source_application.clone(),
            referenced_object: input.object_id,
            total_children_count,
            parents: input.parents.clone(),
        };
        stream.commits.push(CommitRecord {
            seq,
            commit: commit.clone(),
        });
        stream.updated_at = commit.created_at;
        Ok(CommitCreatedEvent {
            stream_id: stream.id.clone(),
            commit,
        })
    }

    pub fn get_commit(&self, identity: &Identity, stream_id: &str, id: &str) -> ServerResult<Commit> {
        let stream = self.stream(stream_id)?;
        stream.require(identity, StreamRole::Reviewer)?;
        stream
            .commits
            .iter()
            .find(|c| c.commit.id == id)
            .map(|c| c.commit.clone())
            .ok_or_else(|| ServerError::CommitNotFound {
                stream: stream_id.to_string(),
                commit: id.to_string(),
            })
    }

    pub fn list_commits(&self, identity: &Identity, stream_id: &str, limit: usize, cursor: Option<&str>) -> ServerResult<Page<Commit>> {
        let stream = self.stream(stream_id)?;
        stream.require(identity, StreamRole::Reviewer)?;
        stream.commit_page(None, self.limits.clamp(limit), cursor)
    }

    /// Authors may edit their own commits; owners may edit any.
    pub fn update_commit(&mut self, identity: &Identity, input: &CommitUpdateInput) -> ServerResult<()> {
        let stream = self.stream_mut(&input.stream_id)?;
        stream.require(identity, StreamRole::Contributor)?;
        let is_owner = stream.role_of(identity) == Some(StreamRole::Owner);
        let stream_id = stream.id.clone();
        let record = stream.commit_mut(&input.id)?;
        if !is_owner && identity.user_id() != Some(record.commit.author_id.as_str()) {
            return Err(ServerError::Forbidden {
                stream: stream_id,
                action: "edit another user's commit".into(),
            });
        }
        record.commit.message = input.message.clone();
        Ok(())
    }

    pub fn delete_commit(&mut self, identity: &Identity, input: &CommitDeleteInput) -> ServerResult<()> {
        let stream = self.stream_mut(&input.stream_id)?;
        stream.require(identity, StreamRole::Contributor)?;
        let is_owner = stream.role_of(identity) == Some(StreamRole::Owner);
        let stream_id = stream.id.clone();
        let author = stream.commit_mut(&input.id)?.commit.author_id.clone();
        if !is_owner && identity.user_id() != Some(author.as_str()) {
            return Err(ServerError::Forbidden {
                stream: stream_id,
                action: "delete another user's commit".into(),
            });
        }
        stream.commits.retain(|c| c.commit.id != input.id);
        Ok(())
    }

    /// Acknowledge a receive. Only checks that the commit exists and is readable.
    pub fn commit_received(&self, identity: &Identity, stream_id: &str, commit_id: &str) -> ServerResult<()> {
        self.get_commit(identity, stream_id, commit_id).map(|_| ())
    }
}

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::object::ObjectId;

/// Project (stream) a cached conversion belongs to.
///
/// Cache keys always pair an application id with a scope: the same host
/// object sent to two projects must not share an entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectScope(String);

impl ProjectScope {
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectScope {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Pointer to content serialized by an earlier send.
///
/// `closure` is the referenced record's own closure (child id to minimum
/// depth), so a parent that reuses the reference can still report its full
/// transitive closure without re-serializing the child.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub referenced_id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub closure: BTreeMap<ObjectId, u32>,
}

impl ObjectReference {
    pub fn new(referenced_id: ObjectId) -> Self {
        Self {
            referenced_id,
            application_id: None,
            closure: BTreeMap::new(),
        }
    }

    pub fn with_application_id(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }

    pub fn with_closure(mut self, closure: BTreeMap<ObjectId, u32>) -> Self {
        self.closure = closure;
        self
    }

    /// Records reachable through this reference, itself included.
    pub fn record_count(&self) -> usize {
        self.closure.len() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_serializes_camel_case() {
        let id = ObjectId::from_hash([3; 32]);
        let reference = ObjectReference::new(id).with_application_id("wall-1");
        let json = serde_json::to_value(&reference).unwrap();
        assert_eq!(json["referencedId"], id.to_hex());
        assert_eq!(json["applicationId"], "wall-1");
        assert!(json.get("closure").is_none());
    }

    #[test]
    fn record_count_includes_self() {
        let mut closure = BTreeMap::new();
        closure.insert(ObjectId::from_hash([1; 32]), 1);
        closure.insert(ObjectId::from_hash([2; 32]), 2);
        let reference = ObjectReference::new(ObjectId::from_hash([0; 32])).with_closure(closure);
        assert_eq!(reference.record_count(), 3);
    }

    #[test]
    fn scopes_compare_by_name() {
        assert_eq!(ProjectScope::from("a"), ProjectScope::new("a"));
        assert_ne!(ProjectScope::from("a"), ProjectScope::from("b"));
        assert_eq!(ProjectScope::from("p").to_string(), "p");
    }
}

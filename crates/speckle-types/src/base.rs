use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::object::ObjectId;
use crate::value::Value;
use crate::wire;

/// Prefix marking internal members that are never serialized.
pub const INTERNAL_PREFIX: &str = "__";

/// Member names that collide with the reserved keys of a serialized record.
pub const RESERVED_MEMBERS: &[&str] = &[
    wire::ID,
    wire::SPECKLE_TYPE,
    wire::APPLICATION_ID,
    wire::TOTAL_CHILDREN_COUNT,
];

/// A self-describing node: a `speckle_type` discriminator, an optional
/// host-assigned `applicationId`, and an ordered bag of dynamic members.
///
/// Members are kept in key order, which is also the order the decomposition
/// engine visits them in and the order they appear in canonical bodies.
/// `id` is never assigned by callers; it is filled in when a node is
/// rehydrated from a stored record.
#[derive(Clone, Debug, Default)]
pub struct Base {
    speckle_type: String,
    application_id: Option<String>,
    id: Option<ObjectId>,
    members: BTreeMap<String, Value>,
}

impl Base {
    pub fn new(speckle_type: impl Into<String>) -> Self {
        Self {
            speckle_type: speckle_type.into(),
            ..Default::default()
        }
    }

    pub fn speckle_type(&self) -> &str {
        &self.speckle_type
    }

    pub fn application_id(&self) -> Option<&str> {
        self.application_id.as_deref()
    }

    pub fn set_application_id(&mut self, application_id: Option<String>) {
        self.application_id = application_id;
    }

    pub fn with_application_id(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }

    /// Content id of the record this node was rehydrated from, if any.
    pub fn id(&self) -> Option<ObjectId> {
        self.id
    }

    pub fn set_id(&mut self, id: Option<ObjectId>) {
        self.id = id;
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.members.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.members.get_mut(name)
    }

    /// Set a member, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.members.insert(name.into(), value.into())
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.members.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// All members, internal ones included.
    pub fn members(&self) -> &BTreeMap<String, Value> {
        &self.members
    }

    /// Members that take part in serialization (no `__` prefix).
    pub fn dynamic_members(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.members
            .iter()
            .filter(|(name, _)| !name.starts_with(INTERNAL_PREFIX))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Wrap this node in a shared handle.
    pub fn into_ref(self) -> NodeRef {
        NodeRef::new(self)
    }
}

/// Structural equality over what a record would carry: type, application id,
/// and serialized members. The content id and internal members are ignored.
impl PartialEq for Base {
    fn eq(&self, other: &Self) -> bool {
        self.speckle_type == other.speckle_type
            && self.application_id == other.application_id
            && self.dynamic_members().eq(other.dynamic_members())
    }
}

/// A shared, mutable handle to a [`Base`].
///
/// Graph edges are `NodeRef`s, so a subgraph can be shared by several parents
/// (a DAG). Nothing prevents building a cycle through [`write`](Self::write);
/// the decomposition engine rejects those at flatten time.
#[derive(Clone)]
pub struct NodeRef(Arc<RwLock<Base>>);

impl NodeRef {
    pub fn new(base: Base) -> Self {
        Self(Arc::new(RwLock::new(base)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Base> {
        self.0.read_recursive()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Base> {
        self.0.write()
    }

    /// Stable address of the shared node, used for path and sharing checks.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Clone of the node's current state.
    pub fn snapshot(&self) -> Base {
        self.read().clone()
    }

    pub fn speckle_type(&self) -> String {
        self.read().speckle_type().to_string()
    }
}

impl From<Base> for NodeRef {
    fn from(base: Base) -> Self {
        NodeRef::new(base)
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.read() == *other.read()
    }
}

// Shallow so that cyclic graphs can still be printed.
impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = self.read();
        f.debug_struct("NodeRef")
            .field("speckle_type", &base.speckle_type())
            .field("id", &base.id())
            .field("members", &base.members().keys().collect::<Vec<_>>())
            .finish()
    }
}

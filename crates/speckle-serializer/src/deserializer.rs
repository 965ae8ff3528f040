use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use speckle_types::{
    wire, Base, CancellationToken, NodeRef, ObjectId, SchemaRegistry, Value, INTERNAL_PREFIX,
    RESERVED_MEMBERS,
};

use crate::canonical;
use crate::closure::{NoRecords, RecordSource};
use crate::error::{SerializerError, SerializerResult};

/// Rebuilds object graphs from stored records.
///
/// Unknown `speckle_type`s come back as plain dynamic nodes. Known types are
/// checked for their required members. Each record id rehydrates to one
/// [`NodeRef`] per distinct `applicationId` found on references to it, so
/// subgraphs shared on the sending side are shared again while host objects
/// that merely have equal content stay separate.
#[derive(Clone, Copy, Debug)]
pub struct Deserializer<'a> {
    registry: &'a SchemaRegistry,
    verify_ids: bool,
    cancel: Option<&'a CancellationToken>,
}

enum Resolved {
    Node(NodeRef),
    Chunk(Vec<Value>),
}

impl<'a> Deserializer<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            verify_ids: true,
            cancel: None,
        }
    }

    /// Recompute every record's id and reject mismatches (on by default).
    pub fn verify_ids(mut self, verify: bool) -> Self {
        self.verify_ids = verify;
        self
    }

    /// Check `token` before each record is rehydrated.
    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Rehydrate the graph rooted at `root_id`.
    ///
    /// Every reference must resolve through `source`; a single missing record
    /// fails the whole call.
    pub fn rehydrate<S>(&self, root_id: &ObjectId, source: &S) -> SerializerResult<NodeRef>
    where
        S: RecordSource + ?Sized,
    {
        let mut run = Rehydrator::new(self, source);
        let root = match run.resolve(root_id)? {
            Resolved::Node(node) => node,
            Resolved::Chunk(_) => {
                return Err(SerializerError::malformed(Some(*root_id), "root record is a chunk"))
            }
        };
        debug!(root = %root_id, records = run.loaded, "rehydrated object graph");
        Ok(root)
    }

    /// Build a graph from fully inlined JSON, as produced by
    /// [`to_plain_json`](crate::to_plain_json).
    pub fn import_json(&self, json: &JsonValue) -> SerializerResult<NodeRef> {
        let object = json
            .as_object()
            .ok_or_else(|| SerializerError::malformed(None, "expected a JSON object"))?;
        let mut run = Rehydrator::new(self, &NoRecords);
        Ok(NodeRef::new(run.node_from_object(object, None)?))
    }
}

struct Rehydrator<'d, 'a, S: ?Sized> {
    deserializer: &'d Deserializer<'a>,
    source: &'d S,
    nodes: HashMap<ObjectId, NodeRef>,
    /// Nodes whose referencing edge names another `applicationId` than the record.
    relabeled: HashMap<(ObjectId, Option<String>), NodeRef>,
    chunks: HashMap<ObjectId, Vec<Value>>,
    path: HashSet<ObjectId>,
    loaded: usize,
}

impl<'d, 'a, S: RecordSource + ?Sized> Rehydrator<'d, 'a, S> {
    fn new(deserializer: &'d Deserializer<'a>, source: &'d S) -> Self {
        Self {
            deserializer,
            source,
            nodes: HashMap::new(),
            relabeled: HashMap::new(),
            chunks: HashMap::new(),
            path: HashSet::new(),
            loaded: 0,
        }
    }

    fn resolve(&mut self, id: &ObjectId) -> SerializerResult<Resolved> {
        if let Some(node) = self.nodes.get(id) {
            return Ok(Resolved::Node(node.clone()));
        }
        if let Some(values) = self.chunks.get(id) {
            return Ok(Resolved::Chunk(values.clone()));
        }
        if self.path.contains(id) {
            return Err(SerializerError::RecordCycle(*id));
        }
        if self.deserializer.cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(SerializerError::Cancelled);
        }

        let body = self
            .source
            .record(id)
            .ok_or(SerializerError::MissingObject(*id))?;
        let json: JsonValue = serde_json::from_str(body)
            .map_err(|e| SerializerError::malformed(Some(*id), e.to_string()))?;
        if self.deserializer.verify_ids {
            let actual = canonical::compute_id(&json);
            if actual != *id {
                return Err(SerializerError::HashMismatch {
                    expected: *id,
                    actual,
                });
            }
        }
        let object = json
            .as_object()
            .ok_or_else(|| SerializerError::malformed(Some(*id), "record is not a JSON object"))?;

        self.loaded += 1;
        self.path.insert(*id);
        let resolved = if object.get(wire::SPECKLE_TYPE).and_then(JsonValue::as_str) == Some(wire::CHUNK_TYPE) {
            let data = object
                .get(wire::CHUNK_DATA)
                .and_then(JsonValue::as_array)
                .ok_or_else(|| SerializerError::malformed(Some(*id), "chunk without data"))?;
            let values = self.list_from_json(data)?;
            self.chunks.insert(*id, values.clone());
            Resolved::Chunk(values)
        } else {
            let mut base = self.node_from_object(object, Some(*id))?;
            base.set_id(Some(*id));
            let node = NodeRef::new(base);
            self.nodes.insert(*id, node.clone());
            Resolved::Node(node)
        };
        self.path.remove(id);
        Ok(resolved)
    }

    /// Resolve a reference, honouring the `applicationId` it carries.
    fn resolve_reference(&mut self, reference: &JsonValue, id: &ObjectId) -> SerializerResult<Resolved> {
        let node = match self.resolve(id)? {
            Resolved::Node(node) => node,
            chunk => return Ok(chunk),
        };
        let application_id = canonical::reference_application_id(reference);
        if node.read().application_id() == application_id {
            return Ok(Resolved::Node(node));
        }
        let key = (*id, application_id.map(str::to_string));
        let relabeled = self
            .relabeled
            .entry(key)
            .or_insert_with(|| {
                let mut base = node.snapshot();
                base.set_application_id(application_id.map(str::to_string));
                NodeRef::new(base)
            })
            .clone();
        Ok(Resolved::Node(relabeled))
    }

    fn node_from_object(&mut self, object: &Map<String, JsonValue>, id: Option<ObjectId>) -> SerializerResult<Base> {
        let speckle_type = object
            .get(wire::SPECKLE_TYPE)
            .and_then(JsonValue::as_str)
            .ok_or_else(|| SerializerError::malformed(id, "missing speckle_type"))?;
        let mut base = Base::new(speckle_type);
        if let Some(application_id) = object.get(wire::APPLICATION_ID).and_then(JsonValue::as_str) {
            base.set_application_id(Some(application_id.to_string()));
        }
        for (key, value) in object {
            if RESERVED_MEMBERS.contains(&key.as_str()) || key.starts_with(INTERNAL_PREFIX) {
                continue;
            }
            base.set(key.clone(), self.value_from_json(value)?);
        }
        self.check_schema(&base)?;
        Ok(base)
    }

    fn check_schema(&self, base: &Base) -> SerializerResult<()> {
        let registry = self.deserializer.registry;
        if !registry.knows(base.speckle_type()) {
            debug!(speckle_type = base.speckle_type(), "unknown type kept as a dynamic node");
            return Ok(());
        }
        for member in registry.required_members(base.speckle_type()) {
            if !base.contains(&member) {
                return Err(SerializerError::MissingRequiredMember {
                    speckle_type: base.speckle_type().to_string(),
                    member,
                });
            }
        }
        Ok(())
    }

    fn value_from_json(&mut self, value: &JsonValue) -> SerializerResult<Value> {
        let converted = match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| SerializerError::malformed(None, format!("unrepresentable number {n}")))?,
            },
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(items) => Value::List(self.list_from_json(items)?),
            JsonValue::Object(map) => {
                if let Some(target) = canonical::referenced_id(value) {
                    match self.resolve_reference(value, &target?)? {
                        Resolved::Node(node) => Value::Node(node),
                        Resolved::Chunk(values) => Value::List(values),
                    }
                } else if map.contains_key(wire::SPECKLE_TYPE) {
                    Value::Node(NodeRef::new(self.node_from_object(map, None)?))
                } else {
                    let mut out = BTreeMap::new();
                    for (key, item) in map {
                        out.insert(key.clone(), self.value_from_json(item)?);
                    }
                    Value::Map(out)
                }
            }
        };
        Ok(converted)
    }

    /// Convert a JSON array, splicing referenced chunks back in place.
    fn list_from_json(&mut self, items: &[JsonValue]) -> SerializerResult<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match canonical::referenced_id(item) {
                Some(target) => match self.resolve_reference(item, &target?)? {
                    Resolved::Node(node) => out.push(Value::Node(node)),
                    Resolved::Chunk(values) => out.extend(values),
                },
                None => out.push(self.value_from_json(item)?),
            }
        }
        Ok(out)
    }
}

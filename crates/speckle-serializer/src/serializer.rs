use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::{Map, Value as JsonValue};
use tracing::{debug, trace};

use speckle_cache::ConversionCache;
use speckle_types::{
    wire, Base, NodeRef, ObjectId, ObjectReference, ProjectScope, SchemaRegistry, Value,
    RESERVED_MEMBERS,
};

use crate::canonical;
use crate::closure::{ClosureTable, FlattenStats, Record};
use crate::error::{SerializerError, SerializerResult};

/// Flattens object graphs into [`ClosureTable`]s.
///
/// A serializer borrows the type registry it consults for member flags and,
/// optionally, a conversion cache scoped to one project. It holds no state
/// between calls, so one instance can flatten any number of graphs.
#[derive(Clone, Copy, Debug)]
pub struct Serializer<'a> {
    registry: &'a SchemaRegistry,
    cache: Option<(&'a ConversionCache, &'a ProjectScope)>,
}

impl<'a> Serializer<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            cache: None,
        }
    }

    /// Reuse cached references for detachable nodes with an application id.
    pub fn with_cache(mut self, cache: &'a ConversionCache, scope: &'a ProjectScope) -> Self {
        self.cache = Some((cache, scope));
        self
    }

    /// Decompose `root` into content-addressed records.
    ///
    /// The root is always serialized, even when its application id is cached,
    /// so the returned table contains at least the root record.
    pub fn flatten(&self, root: &NodeRef) -> SerializerResult<(ObjectId, ClosureTable)> {
        let mut run = Flattener {
            serializer: self,
            records: Vec::new(),
            seen: HashSet::new(),
            path: HashSet::new(),
            shared: HashMap::new(),
            stats: FlattenStats::default(),
            cache_entries: Vec::new(),
        };
        let root_record = run.detach_node(root)?;
        debug!(
            root = %root_record.id,
            records = run.records.len(),
            nodes = run.stats.nodes_visited,
            cache_hits = run.stats.cache_hits,
            "flattened object graph"
        );
        let table = ClosureTable::new(root_record.id, run.records, run.stats, run.cache_entries);
        Ok((root_record.id, table))
    }
}

#[derive(Clone, Debug)]
struct Detached {
    id: ObjectId,
    closure: BTreeMap<ObjectId, u32>,
}

/// Closure of the record under construction.
#[derive(Default)]
struct Closure {
    /// Direct child id to the size of that child's closure.
    direct: BTreeMap<ObjectId, usize>,
    /// Every reachable record with its minimum depth.
    all: BTreeMap<ObjectId, u32>,
}

impl Closure {
    fn add_child(&mut self, child: &Detached) {
        self.direct.insert(child.id, child.closure.len());
        keep_min(&mut self.all, child.id, 1);
        for (id, depth) in &child.closure {
            keep_min(&mut self.all, *id, depth + 1);
        }
    }
}

fn keep_min(map: &mut BTreeMap<ObjectId, u32>, id: ObjectId, depth: u32) {
    map.entry(id)
        .and_modify(|d| *d = (*d).min(depth))
        .or_insert(depth);
}

struct Flattener<'s, 'a> {
    serializer: &'s Serializer<'a>,
    records: Vec<Record>,
    seen: HashSet<ObjectId>,
    /// Addresses of the nodes on the current traversal path.
    path: HashSet<usize>,
    /// Detached nodes already serialized in this run, by address.
    shared: HashMap<usize, Detached>,
    stats: FlattenStats,
    cache_entries: Vec<(String, ObjectReference)>,
}

impl Flattener<'_, '_> {
    fn enter(&mut self, node: &NodeRef, base: &Base) -> SerializerResult<()> {
        if !self.path.insert(node.addr()) {
            return Err(SerializerError::CycleDetected {
                speckle_type: base.speckle_type().to_string(),
            });
        }
        Ok(())
    }

    fn leave(&mut self, node: &NodeRef) {
        self.path.remove(&node.addr());
    }

    fn detach_node(&mut self, node: &NodeRef) -> SerializerResult<Detached> {
        if let Some(done) = self.shared.get(&node.addr()) {
            self.stats.shared_reuses += 1;
            return Ok(done.clone());
        }
        let base = node.read();
        self.enter(node, &base)?;
        let mut closure = Closure::default();
        let body = self.node_body(&base, &mut closure)?;
        self.leave(node);

        let detached = self.finish_record(body, closure);
        if let Some(application_id) = base.application_id() {
            let reference = ObjectReference::new(detached.id)
                .with_application_id(application_id)
                .with_closure(detached.closure.clone());
            self.cache_entries.push((application_id.to_string(), reference));
        }
        self.shared.insert(node.addr(), detached.clone());
        Ok(detached)
    }

    fn detach_child(&mut self, node: &NodeRef) -> SerializerResult<Detached> {
        if let Some((cache, scope)) = self.serializer.cache {
            let application_id = node.read().application_id().map(str::to_string);
            if let Some(hit) = application_id.and_then(|app| cache.try_get(scope, &app)) {
                trace!(id = %hit.referenced_id, "conversion cache hit");
                self.stats.cache_hits += hit.record_count();
                return Ok(Detached {
                    id: hit.referenced_id,
                    closure: hit.closure,
                });
            }
        }
        self.detach_node(node)
    }

    fn node_body(&mut self, base: &Base, closure: &mut Closure) -> SerializerResult<Map<String, JsonValue>> {
        self.stats.nodes_visited += 1;
        let speckle_type = base.speckle_type();
        if speckle_type == wire::REFERENCE_TYPE || speckle_type == wire::CHUNK_TYPE {
            return Err(SerializerError::ReservedType(speckle_type.to_string()));
        }

        let mut body = Map::new();
        body.insert(wire::SPECKLE_TYPE.into(), speckle_type.into());
        if let Some(application_id) = base.application_id() {
            body.insert(wire::APPLICATION_ID.into(), application_id.into());
        }
        for (name, value) in base.dynamic_members() {
            if RESERVED_MEMBERS.contains(&name.as_str()) {
                return Err(SerializerError::ReservedMember {
                    speckle_type: speckle_type.to_string(),
                    member: name.clone(),
                });
            }
            let flags = self.serializer.registry.member_flags(speckle_type, name);
            let json = match (flags.chunk_size, value) {
                (Some(size), Value::List(items)) => self.chunk(items, size, name, closure)?,
                _ => self.value_json(value, flags.detachable, name, closure)?,
            };
            body.insert(name.clone(), json);
        }
        Ok(body)
    }

    fn value_json(
        &mut self,
        value: &Value,
        detach: bool,
        member: &str,
        closure: &mut Closure,
    ) -> SerializerResult<JsonValue> {
        let json = match value {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => canonical::float(*f, member)?,
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Node(node) if detach => {
                let child = self.detach_child(node)?;
                closure.add_child(&child);
                canonical::reference(&child.id, node.read().application_id())
            }
            Value::Node(node) => {
                let base = node.read();
                self.enter(node, &base)?;
                let body = self.node_body(&base, closure)?;
                self.leave(node);
                JsonValue::Object(body)
            }
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.value_json(item, detach, member, closure)?);
                }
                JsonValue::Array(out)
            }
            Value::Map(map) => {
                let mut out = Map::new();
                for (key, item) in map {
                    if key == wire::SPECKLE_TYPE {
                        return Err(SerializerError::ReservedMember {
                            speckle_type: "map".into(),
                            member: format!("{member}.{key}"),
                        });
                    }
                    out.insert(key.clone(), self.value_json(item, detach, member, closure)?);
                }
                JsonValue::Object(out)
            }
        };
        Ok(json)
    }

    /// Split `items` into chunk records of at most `size` elements.
    fn chunk(
        &mut self,
        items: &[Value],
        size: usize,
        member: &str,
        closure: &mut Closure,
    ) -> SerializerResult<JsonValue> {
        let mut references = Vec::with_capacity(items.len().div_ceil(size));
        for group in items.chunks(size) {
            let mut chunk_closure = Closure::default();
            let mut data = Vec::with_capacity(group.len());
            for item in group {
                data.push(self.value_json(item, true, member, &mut chunk_closure)?);
            }
            let mut body = Map::new();
            body.insert(wire::SPECKLE_TYPE.into(), wire::CHUNK_TYPE.into());
            body.insert(wire::CHUNK_DATA.into(), JsonValue::Array(data));
            let chunk = self.finish_record(body, chunk_closure);
            closure.add_child(&chunk);
            references.push(canonical::reference(&chunk.id, None));
        }
        Ok(JsonValue::Array(references))
    }

    fn finish_record(&mut self, mut body: Map<String, JsonValue>, closure: Closure) -> Detached {
        body.insert(wire::TOTAL_CHILDREN_COUNT.into(), closure.all.len().into());
        if !closure.direct.is_empty() {
            let direct: Map<String, JsonValue> = closure
                .direct
                .iter()
                .map(|(id, size)| (id.to_hex(), JsonValue::from(*size)))
                .collect();
            body.insert(wire::CLOSURE.into(), JsonValue::Object(direct));
        }

        let mut body = JsonValue::Object(body);
        let id = canonical::compute_id(&body);
        if let Some(map) = body.as_object_mut() {
            map.insert(wire::ID.into(), id.to_hex().into());
        }
        if self.seen.insert(id) {
            self.records.push(Record {
                id,
                body: canonical::to_canonical_string(&body),
                closure: closure.all.clone(),
            });
        }
        Detached {
            id,
            closure: closure.all,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::Value as JsonValue;

    use speckle_types::{Collection, MemberSchema, Point, SpeckleObject, TypeSchema};

    use super::*;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::with_builtin_kit()
    }

    fn point(x: f64) -> Base {
        Point::new(x, 2.0, 3.0).to_base()
    }

    fn body_of(table: &ClosureTable, id: &ObjectId) -> JsonValue {
        serde_json::from_str(&table.get(id).unwrap().body).unwrap()
    }

    fn collection(n: usize) -> NodeRef {
        let mut collection = Collection::new("things");
        for i in 0..n {
            collection.push(point(i as f64));
        }
        collection.to_base().into_ref()
    }

    // ------------------------------------------------------------------
    // Basic shapes
    // ------------------------------------------------------------------

    #[test]
    fn single_point_is_one_record() {
        let registry = registry();
        let root = point(1.0).into_ref();
        let (id, table) = Serializer::new(&registry).flatten(&root).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.root_id(), id);
        let body = body_of(&table, &id);
        assert_eq!(body["speckle_type"], Point::SPECKLE_TYPE);
        assert_eq!(body["x"], 1.0);
        assert_eq!(body["id"], id.to_hex());
        assert_eq!(body["totalChildrenCount"], 0);
        assert!(body.get("__closure").is_none());
    }

    #[test]
    fn inline_children_stay_in_parent_body() {
        let registry = registry();
        let root = Base::new("Line")
            .with("start", point(0.0))
            .with("end", point(1.0))
            .into_ref();
        let (id, table) = Serializer::new(&registry).flatten(&root).unwrap();

        assert_eq!(table.len(), 1);
        let body = body_of(&table, &id);
        assert_eq!(body["start"]["speckle_type"], Point::SPECKLE_TYPE);
        assert_eq!(body["end"]["x"], 1.0);
    }

    #[test]
    fn detached_member_becomes_reference() {
        let registry = registry();
        let root = Base::new("Wall").with("@displayValue", point(5.0)).into_ref();
        let (id, table) = Serializer::new(&registry).flatten(&root).unwrap();

        assert_eq!(table.len(), 2);
        let body = body_of(&table, &id);
        let child_id: ObjectId = body["@displayValue"]["referencedId"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(body["@displayValue"]["speckle_type"], "reference");
        assert!(table.contains(&child_id));
        assert_eq!(body["totalChildrenCount"], 1);
        assert_eq!(body["__closure"][child_id.to_hex()], 0);
        assert_eq!(table.records().last().unwrap().id, id);
    }

    #[test]
    fn reference_carries_child_application_id() {
        let registry = registry();
        let root = Base::new("Wall")
            .with("@a", point(5.0).with_application_id("host-A"))
            .with("@b", point(5.0))
            .into_ref();
        let (id, table) = Serializer::new(&registry).flatten(&root).unwrap();

        let body = body_of(&table, &id);
        assert_eq!(body["@a"]["applicationId"], "host-A");
        assert!(body["@b"].get("applicationId").is_none());
        assert_eq!(body["@a"]["referencedId"], body["@b"]["referencedId"]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn detachable_list_detaches_each_node() {
        let registry = registry();
        let root = Base::new("Group")
            .with("@items", vec![Value::from(point(1.0)), Value::from(7), Value::from(point(2.0))])
            .into_ref();
        let (id, table) = Serializer::new(&registry).flatten(&root).unwrap();

        assert_eq!(table.len(), 3);
        let body = body_of(&table, &id);
        assert_eq!(body["@items"][0]["speckle_type"], "reference");
        assert_eq!(body["@items"][1], 7);
        assert_eq!(body["@items"][2]["speckle_type"], "reference");
    }

    #[test]
    fn registry_flags_drive_detachment() {
        let mut registry = SchemaRegistry::new();
        registry.register(TypeSchema::new("Beam").member(MemberSchema::detachable("profile")));
        let root = Base::new("Beam").with("profile", point(0.0)).into_ref();
        let (_, table) = Serializer::new(&registry).flatten(&root).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn closure_tracks_transitive_depths() {
        let registry = registry();
        let leaf = point(9.0);
        let middle = Base::new("Middle").with("@leaf", leaf);
        let root = Base::new("Top").with("@middle", middle).into_ref();
        let (id, table) = Serializer::new(&registry).flatten(&root).unwrap();

        let root_record = table.get(&id).unwrap();
        let depths: Vec<u32> = root_record.closure.values().copied().collect();
        assert_eq!(root_record.closure.len(), 2);
        assert!(depths.contains(&1) && depths.contains(&2));
        assert_eq!(body_of(&table, &id)["totalChildrenCount"], 2);
    }

    // ------------------------------------------------------------------
    // Chunking
    // ------------------------------------------------------------------

    #[test]
    fn collection_of_1500_points() {
        let registry = registry();
        let (id, table) = Serializer::new(&registry).flatten(&collection(1500)).unwrap();

        assert_eq!(table.len(), 1500 + 2 + 1);
        let chunks: Vec<_> = table
            .iter()
            .filter(|r| r.body.contains("\"speckle_type\":\"chunk\""))
            .collect();
        assert_eq!(chunks.len(), 2);
        let body = body_of(&table, &id);
        assert_eq!(body["elements"].as_array().unwrap().len(), 2);
        assert_eq!(body["totalChildrenCount"], 1502);
    }

    #[test]
    fn chunk_count_is_ceiling_of_length_over_size() {
        let registry = registry();
        for (n, size, expected) in [(10, 3, 4), (9, 3, 3), (1, 5, 1), (0, 5, 0)] {
            let items: Vec<Value> = (0..n).map(Value::from).collect();
            let root = Base::new("Numbers")
                .with(format!("@({size})values"), items)
                .into_ref();
            let (id, table) = Serializer::new(&registry).flatten(&root).unwrap();
            assert_eq!(table.len(), expected + 1, "n={n} size={size}");
            let body = body_of(&table, &id);
            assert_eq!(body[format!("@({size})values")].as_array().unwrap().len(), expected);
        }
    }

    #[test]
    fn parent_size_does_not_grow_with_chunked_length() {
        let registry = registry();
        let (small_id, small) = Serializer::new(&registry).flatten(&collection(1200)).unwrap();
        let (large_id, large) = Serializer::new(&registry).flatten(&collection(1900)).unwrap();
        assert_eq!(
            small.get(&small_id).unwrap().size(),
            large.get(&large_id).unwrap().size()
        );
        assert!(large.largest_record() < 1000 * 200);
    }

    // ------------------------------------------------------------------
    // Content addressing
    // ------------------------------------------------------------------

    #[test]
    fn flatten_is_deterministic() {
        let registry = registry();
        let root = collection(25);
        let (a, table_a) = Serializer::new(&registry).flatten(&root).unwrap();
        let (b, table_b) = Serializer::new(&registry).flatten(&root).unwrap();
        assert_eq!(a, b);
        assert_eq!(table_a.to_pairs(), table_b.to_pairs());
    }

    #[test]
    fn application_id_does_not_change_id() {
        let registry = registry();
        let plain = point(1.0).into_ref();
        let tagged = point(1.0).with_application_id("host-7").into_ref();
        let (a, _) = Serializer::new(&registry).flatten(&plain).unwrap();
        let (b, table) = Serializer::new(&registry).flatten(&tagged).unwrap();
        assert_eq!(a, b);
        assert_eq!(body_of(&table, &b)["applicationId"], "host-7");
    }

    #[test]
    fn identical_subgraphs_are_stored_once() {
        let registry = registry();
        let root = Base::new("Pair")
            .with("@a", point(1.0))
            .with("@b", point(1.0))
            .into_ref();
        let (_, table) = Serializer::new(&registry).flatten(&root).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn shared_handles_are_serialized_once() {
        let registry = registry();
        let shared = point(4.0).into_ref();
        let root = Base::new("Pair")
            .with("@a", shared.clone())
            .with("@b", shared)
            .into_ref();
        let (_, table) = Serializer::new(&registry).flatten(&root).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.stats().shared_reuses, 1);
    }

    #[test]
    fn int_and_float_hash_differently() {
        let registry = registry();
        let int = Base::new("N").with("v", 1).into_ref();
        let float = Base::new("N").with("v", 1.0).into_ref();
        let (a, _) = Serializer::new(&registry).flatten(&int).unwrap();
        let (b, _) = Serializer::new(&registry).flatten(&float).unwrap();
        assert_ne!(a, b);
    }

    // ------------------------------------------------------------------
    // Structural errors
    // ------------------------------------------------------------------

    #[test]
    fn self_reference_is_rejected() {
        let registry = registry();
        let node = Base::new("Loop").into_ref();
        node.write().set("@me", node.clone());
        let err = Serializer::new(&registry).flatten(&node).unwrap_err();
        assert_eq!(err, SerializerError::CycleDetected { speckle_type: "Loop".into() });
    }

    #[test]
    fn inline_cycle_is_rejected() {
        let registry = registry();
        let a = Base::new("A").into_ref();
        let b = Base::new("B").with("back", a.clone()).into_ref();
        a.write().set("next", b);
        assert!(matches!(
            Serializer::new(&registry).flatten(&a),
            Err(SerializerError::CycleDetected { .. })
        ));
    }

    #[test]
    fn reserved_member_names_are_rejected() {
        let registry = registry();
        let root = Base::new("Thing").with("id", "mine").into_ref();
        assert_eq!(
            Serializer::new(&registry).flatten(&root).unwrap_err(),
            SerializerError::ReservedMember {
                speckle_type: "Thing".into(),
                member: "id".into()
            }
        );
    }

    #[test]
    fn reserved_types_are_rejected() {
        let registry = registry();
        let root = Base::new("chunk").into_ref();
        assert_eq!(
            Serializer::new(&registry).flatten(&root).unwrap_err(),
            SerializerError::ReservedType("chunk".into())
        );
    }

    #[test]
    fn maps_may_not_carry_speckle_type() {
        let registry = registry();
        let mut map = BTreeMap::new();
        map.insert("speckle_type".to_string(), Value::from("sneaky"));
        let root = Base::new("Thing").with("props", map).into_ref();
        assert!(matches!(
            Serializer::new(&registry).flatten(&root),
            Err(SerializerError::ReservedMember { .. })
        ));
    }

    #[test]
    fn nan_is_rejected() {
        let registry = registry();
        let root = Base::new("Thing").with("v", f64::NAN).into_ref();
        assert_eq!(
            Serializer::new(&registry).flatten(&root).unwrap_err(),
            SerializerError::NonFiniteNumber { member: "v".into() }
        );
    }

    #[test]
    fn internal_members_are_not_serialized() {
        let registry = registry();
        let root = point(1.0).with("__scratch", 99).into_ref();
        let (id, table) = Serializer::new(&registry).flatten(&root).unwrap();
        assert!(body_of(&table, &id).get("__scratch").is_none());
    }

    // ------------------------------------------------------------------
    // Conversion cache
    // ------------------------------------------------------------------

    fn wall(n: usize) -> NodeRef {
        let mut collection = Collection::new("walls");
        for i in 0..n {
            collection.push(point(i as f64).with_application_id(format!("wall-{i}")));
        }
        Base::new("Model")
            .with("@walls", collection.to_base().with_application_id("walls"))
            .into_ref()
    }

    #[test]
    fn cache_entries_cover_application_ids() {
        let registry = registry();
        let (_, table) = Serializer::new(&registry).flatten(&wall(3)).unwrap();
        let ids: Vec<&str> = table.cache_entries().iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(ids, vec!["wall-0", "wall-1", "wall-2", "walls"]);
    }

    #[test]
    fn cached_subgraph_is_skipped_with_full_hit_count() {
        let registry = registry();
        let cache = ConversionCache::new();
        let scope = ProjectScope::from("project");
        let root = wall(3);

        let serializer = Serializer::new(&registry).with_cache(&cache, &scope);
        let (first_id, first) = serializer.flatten(&root).unwrap();
        assert_eq!(first.stats().cache_hits, 0);
        for (app, reference) in first.cache_entries() {
            cache.set(&scope, app, reference.clone());
        }

        let (second_id, second) = serializer.flatten(&root).unwrap();
        assert_eq!(second_id, first_id);
        // Collection, one chunk, three points.
        assert_eq!(second.stats().cache_hits, 5);
        assert_eq!(second.len(), 1);
        assert_eq!(
            body_of(&second, &second_id)["totalChildrenCount"],
            body_of(&first, &first_id)["totalChildrenCount"]
        );
    }

    #[test]
    fn cache_is_scoped_by_project() {
        let registry = registry();
        let cache = ConversionCache::new();
        let a = ProjectScope::from("a");
        let b = ProjectScope::from("b");
        let root = wall(2);

        let (_, table) = Serializer::new(&registry).with_cache(&cache, &a).flatten(&root).unwrap();
        for (app, reference) in table.cache_entries() {
            cache.set(&a, app, reference.clone());
        }
        let (_, other) = Serializer::new(&registry).with_cache(&cache, &b).flatten(&root).unwrap();
        assert_eq!(other.stats().cache_hits, 0);
        assert_eq!(other.len(), table.len());
    }

    proptest! {
        #[test]
        fn flatten_determinism(values in proptest::collection::vec(-1.0e6f64..1.0e6, 0..40), chunk in 1usize..8) {
            let registry = registry();
            let build = || {
                let items: Vec<Value> = values.iter().map(|v| Value::from(point(*v))).collect();
                Base::new("Cloud").with(format!("@({chunk})points"), items).into_ref()
            };
            let (a, table_a) = Serializer::new(&registry).flatten(&build()).unwrap();
            let (b, table_b) = Serializer::new(&registry).flatten(&build()).unwrap();
            prop_assert_eq!(a, b);
            prop_assert_eq!(table_a.to_pairs(), table_b.to_pairs());
        }
    }
}

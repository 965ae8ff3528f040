use std::collections::HashSet;

use serde_json::{Map, Value as JsonValue};

use speckle_types::{wire, NodeRef, Value};

use crate::canonical;
use crate::error::{SerializerError, SerializerResult};

/// Export `root` as a single, fully inlined JSON document.
///
/// Nothing is detached and no ids are written; the result is meant for
/// humans and for [`Deserializer::import_json`](crate::Deserializer::import_json).
pub fn to_plain_json(root: &NodeRef) -> SerializerResult<JsonValue> {
    let mut path = HashSet::new();
    node_json(root, &mut path)
}

fn node_json(node: &NodeRef, path: &mut HashSet<usize>) -> SerializerResult<JsonValue> {
    let base = node.read();
    if !path.insert(node.addr()) {
        return Err(SerializerError::CycleDetected {
            speckle_type: base.speckle_type().to_string(),
        });
    }
    let mut out = Map::new();
    out.insert(wire::SPECKLE_TYPE.into(), base.speckle_type().into());
    if let Some(application_id) = base.application_id() {
        out.insert(wire::APPLICATION_ID.into(), application_id.into());
    }
    for (name, value) in base.dynamic_members() {
        out.insert(name.clone(), value_json(value, name, path)?);
    }
    path.remove(&node.addr());
    Ok(JsonValue::Object(out))
}

fn value_json(value: &Value, member: &str, path: &mut HashSet<usize>) -> SerializerResult<JsonValue> {
    Ok(match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::from(*i),
        Value::Float(f) => canonical::float(*f, member)?,
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Node(node) => node_json(node, path)?,
        Value::List(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| value_json(item, member, path))
                .collect::<SerializerResult<_>>()?,
        ),
        Value::Map(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                out.insert(key.clone(), value_json(item, member, path)?);
            }
            JsonValue::Object(out)
        }
    })
}

#[cfg(test)]
mod tests {
    use speckle_types::{Base, Collection, Point, SchemaRegistry, SpeckleObject};

    use super::*;
    use crate::Deserializer;

    #[test]
    fn export_inlines_everything() {
        let mut collection = Collection::new("layer");
        collection.push(Point::new(1.0, 2.0, 3.0).to_base());
        let root = collection.to_base().into_ref();

        let json = to_plain_json(&root).unwrap();
        assert_eq!(json["elements"][0]["speckle_type"], Point::SPECKLE_TYPE);
        assert!(json.get("id").is_none());
    }

    #[test]
    fn export_then_import_is_identity() {
        let root = Base::new("Thing")
            .with_application_id("t-1")
            .with("@child", Point::new(0.0, 1.0, 2.0).to_base())
            .with("values", vec![1, 2, 3])
            .into_ref();
        let json = to_plain_json(&root).unwrap();
        let registry = SchemaRegistry::with_builtin_kit();
        let back = Deserializer::new(&registry).import_json(&json).unwrap();
        assert_eq!(back, root);
    }

    #[test]
    fn export_rejects_cycles() {
        let node = Base::new("Loop").into_ref();
        node.write().set("self", node.clone());
        assert!(matches!(
            to_plain_json(&node),
            Err(SerializerError::CycleDetected { .. })
        ));
    }
}

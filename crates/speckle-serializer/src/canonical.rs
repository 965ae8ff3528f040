//! Canonical JSON and content ids.
//!
//! A record's id is the domain-separated hash of its *hash view*: the body
//! with object keys sorted and derived keys ([`wire::UNHASHED_KEYS`]) removed
//! from every node object, nested inline nodes included.

use serde_json::{Map, Number, Value as JsonValue};

use speckle_types::{wire, ContentHasher, ObjectId};

use crate::error::{SerializerError, SerializerResult};

fn sorted_entries(map: &Map<String, JsonValue>) -> Vec<(&String, &JsonValue)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

/// Rebuild `value` with every object's keys inserted in sorted order.
pub fn canonicalize(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut out = Map::new();
            for (key, item) in sorted_entries(map) {
                out.insert(key.clone(), canonicalize(item));
            }
            JsonValue::Object(out)
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Compact canonical text of `value`.
pub fn to_canonical_string(value: &JsonValue) -> String {
    canonicalize(value).to_string()
}

/// Canonical body minus the keys that do not contribute to the id.
pub fn hash_view(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let is_node = map.contains_key(wire::SPECKLE_TYPE);
            let mut out = Map::new();
            for (key, item) in sorted_entries(map) {
                if is_node && wire::UNHASHED_KEYS.contains(&key.as_str()) {
                    continue;
                }
                out.insert(key.clone(), hash_view(item));
            }
            JsonValue::Object(out)
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(hash_view).collect()),
        other => other.clone(),
    }
}

/// Content id of a record body.
pub fn compute_id(body: &JsonValue) -> ObjectId {
    ContentHasher::OBJECT.hash(hash_view(body).to_string().as_bytes())
}

/// JSON number for a float member; `-0.0` becomes `0.0`.
pub fn float(value: f64, member: &str) -> SerializerResult<JsonValue> {
    let value = if value == 0.0 { 0.0 } else { value };
    Number::from_f64(value)
        .map(JsonValue::Number)
        .ok_or_else(|| SerializerError::NonFiniteNumber {
            member: member.to_string(),
        })
}

/// Reference object standing in for a detached record.
///
/// The referencing node's `applicationId` rides on the reference, since
/// nodes that differ only by it share one record.
pub fn reference(id: &ObjectId, application_id: Option<&str>) -> JsonValue {
    let mut map = Map::new();
    map.insert(wire::SPECKLE_TYPE.into(), wire::REFERENCE_TYPE.into());
    map.insert(wire::REFERENCED_ID.into(), id.to_hex().into());
    if let Some(application_id) = application_id {
        map.insert(wire::APPLICATION_ID.into(), application_id.into());
    }
    JsonValue::Object(map)
}

/// `applicationId` carried by a reference object.
pub fn reference_application_id(value: &JsonValue) -> Option<&str> {
    value.get(wire::APPLICATION_ID).and_then(JsonValue::as_str)
}

/// If `value` is a reference object, the id it points at.
pub fn referenced_id(value: &JsonValue) -> Option<SerializerResult<ObjectId>> {
    let map = value.as_object()?;
    if map.get(wire::SPECKLE_TYPE).and_then(JsonValue::as_str) != Some(wire::REFERENCE_TYPE) {
        return None;
    }
    let parsed = map
        .get(wire::REFERENCED_ID)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| SerializerError::malformed(None, "reference without referencedId"))
        .and_then(|hex| {
            hex.parse::<ObjectId>()
                .map_err(|e| SerializerError::malformed(None, format!("bad referencedId: {e}")))
        });
    Some(parsed)
}

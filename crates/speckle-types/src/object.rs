use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Content-addressed identifier for a serialized record.
///
/// An `ObjectId` is the domain-separated BLAKE3 hash of a record's canonical
/// hash view (see [`ContentHasher`](crate::ContentHasher)). Identical content
/// always produces the same `ObjectId`, so records deduplicate by
/// construction. On the wire and in JSON bodies it is a 64-character
/// lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// Create an `ObjectId` from a pre-computed hash.
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Two-level shard path used by on-disk stores: `ab/cdef...`.
    pub fn shard(&self) -> (String, String) {
        let hex = self.to_hex();
        (hex[..2].to_string(), hex[2..].to_string())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; 32]> for ObjectId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn sample() -> ObjectId {
        ObjectId::from_hash(*blake3::hash(b"sample").as_bytes())
    }

    proptest! {
        #[test]
        fn hex_forms_parse_back(bytes in any::<[u8; 32]>()) {
            let id = ObjectId::from_hash(bytes);
            prop_assert_eq!(id.to_hex().parse::<ObjectId>().unwrap(), id);
            prop_assert_eq!(ObjectId::from_hex(&id.to_hex().to_uppercase()).unwrap(), id);
            let (dir, file) = id.shard();
            prop_assert_eq!(format!("{dir}{file}"), id.to_hex());
        }
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(matches!(ObjectId::from_hex("zz"), Err(TypeError::InvalidHex(_))));
        assert_eq!(
            ObjectId::from_hex("abcd"),
            Err(TypeError::InvalidLength { expected: 32, actual: 2 })
        );
    }

    #[test]
    fn short_hex_is_8_chars() {
        assert_eq!(sample().short_hex().len(), 8);
    }

    #[test]
    fn display_is_full_hex() {
        let id = sample();
        assert_eq!(format!("{id}").len(), 64);
        assert_eq!(format!("{id}"), id.to_hex());
    }

    #[test]
    fn serializes_as_hex_string() {
        let id = sample();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
        let parsed: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn shard_splits_after_two_chars() {
        let id = sample();
        let (dir, file) = id.shard();
        assert_eq!(dir.len(), 2);
        assert_eq!(format!("{dir}{file}"), id.to_hex());
    }

    #[test]
    fn ordering_is_consistent() {
        let id1 = ObjectId::from_hash([0; 32]);
        let id2 = ObjectId::from_hash([1; 32]);
        assert!(id1 < id2);
    }
}

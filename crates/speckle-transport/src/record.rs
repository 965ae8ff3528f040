use std::collections::BTreeMap;

use serde::Deserialize;

use speckle_types::ObjectId;

use crate::error::{TransportError, TransportResult};

/// The parts of a stored record a transport needs to walk a closure.
///
/// Only the header keys are decoded; members are skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct RecordHeader {
    #[serde(default, rename = "__closure")]
    pub children: BTreeMap<ObjectId, u64>,
    #[serde(default, rename = "totalChildrenCount")]
    pub total_children_count: u64,
}

impl RecordHeader {
    pub fn parse(body: &str) -> TransportResult<Self> {
        serde_json::from_str(body).map_err(|e| TransportError::Malformed(e.to_string()))
    }

    /// Direct children named by the record.
    pub fn child_ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.children.keys()
    }
}

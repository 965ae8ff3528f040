use std::collections::{BTreeMap, HashMap};

use speckle_types::{ObjectId, ObjectReference};

/// One content-addressed record produced by decomposition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub id: ObjectId,
    /// Canonical JSON body, `id` included.
    pub body: String,
    /// Every record reachable from this one, with its minimum depth.
    pub closure: BTreeMap<ObjectId, u32>,
}

impl Record {
    pub fn size(&self) -> usize {
        self.body.len()
    }
}

/// Counters gathered while flattening.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlattenStats {
    /// Nodes traversed, inline and detached.
    pub nodes_visited: usize,
    /// Records skipped thanks to the conversion cache.
    pub cache_hits: usize,
    /// Detached nodes reached more than once through shared handles.
    pub shared_reuses: usize,
}

/// Output of [`Serializer::flatten`](crate::Serializer::flatten).
///
/// Records are ordered children first, so the root record is always last
/// and any record's references precede it.
#[derive(Clone, Debug)]
pub struct ClosureTable {
    root_id: ObjectId,
    records: Vec<Record>,
    index: HashMap<ObjectId, usize>,
    stats: FlattenStats,
    cache_entries: Vec<(String, ObjectReference)>,
}

impl ClosureTable {
    pub(crate) fn new(
        root_id: ObjectId,
        records: Vec<Record>,
        stats: FlattenStats,
        cache_entries: Vec<(String, ObjectReference)>,
    ) -> Self {
        let index = records
            .iter()
            .enumerate()
            .map(|(i, record)| (record.id, i))
            .collect();
        Self {
            root_id,
            records,
            index,
            stats,
            cache_entries,
        }
    }

    pub fn root_id(&self) -> ObjectId {
        self.root_id
    }

    pub fn root(&self) -> Option<&Record> {
        self.get(&self.root_id)
    }

    pub fn get(&self, id: &ObjectId) -> Option<&Record> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains_key(id)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> &FlattenStats {
        &self.stats
    }

    /// `(application id, reference)` pairs to cache once the records are durable.
    pub fn cache_entries(&self) -> &[(String, ObjectReference)] {
        &self.cache_entries
    }

    /// Size in bytes of the largest record body.
    pub fn largest_record(&self) -> usize {
        self.records.iter().map(Record::size).max().unwrap_or(0)
    }

    pub fn total_bytes(&self) -> usize {
        self.records.iter().map(Record::size).sum()
    }

    /// `(id, body)` pairs in upload order.
    pub fn to_pairs(&self) -> Vec<(ObjectId, String)> {
        self.records
            .iter()
            .map(|record| (record.id, record.body.clone()))
            .collect()
    }
}

/// Anything that can hand out record bodies by id.
pub trait RecordSource {
    fn record(&self, id: &ObjectId) -> Option<&str>;
}

impl RecordSource for HashMap<ObjectId, String> {
    fn record(&self, id: &ObjectId) -> Option<&str> {
        self.get(id).map(String::as_str)
    }
}

impl RecordSource for ClosureTable {
    fn record(&self, id: &ObjectId) -> Option<&str> {
        self.get(id).map(|record| record.body.as_str())
    }
}

/// Source with no records; rehydrating anything that references out fails.
pub struct NoRecords;

impl RecordSource for NoRecords {
    fn record(&self, _id: &ObjectId) -> Option<&str> {
        None
    }
}

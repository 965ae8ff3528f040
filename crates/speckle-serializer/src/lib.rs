//! Decomposition engine for Speckle object graphs.
//!
//! [`Serializer::flatten`] walks a graph of [`NodeRef`](speckle_types::NodeRef)s
//! depth-first and splits it along detachable and chunkable members into a
//! [`ClosureTable`] of content-addressed JSON records. [`Deserializer`] does
//! the reverse: given a root id and a source of record bodies, it rebuilds
//! the graph, reassembling chunked sequences and restoring shared subgraphs.
//!
//! # Record format
//!
//! Every record is a JSON object with `id`, `speckle_type`, optional
//! `applicationId`, `totalChildrenCount`, and (when it references other
//! records) `__closure`, mapping each direct child id to the size of that
//! child's closure. Detached values are replaced by
//! `{"speckle_type":"reference","referencedId":"<id>"}`, plus the detached
//! node's `applicationId` when it has one.
//!
//! # Design Rules
//!
//! 1. A record id is a pure function of its canonical hash view.
//! 2. Substitution is total: a detached value is never also inlined.
//! 3. Record size is bounded by member fan-out and chunk size, never by the
//!    length of a chunked sequence.
//! 4. Traversal is synchronous; only transports suspend.

pub mod canonical;
pub mod closure;
pub mod deserializer;
pub mod error;
pub mod plain;
pub mod serializer;

pub use closure::{ClosureTable, FlattenStats, NoRecords, Record, RecordSource};
pub use deserializer::Deserializer;
pub use error::{SerializerError, SerializerResult};
pub use plain::to_plain_json;
pub use serializer::Serializer;

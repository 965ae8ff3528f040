//! Conversion cache for incremental sends.
//!
//! Hosts assign stable application ids to the objects they convert. After a
//! successful send, each detached record produced from such an object is
//! remembered as an [`ObjectReference`](speckle_types::ObjectReference) under
//! `(project scope, application id)`. The next send of the same project can
//! then reuse the reference instead of re-serializing an unchanged subgraph.
//!
//! # Design Rules
//!
//! 1. Keys always include the project scope; an application id alone is never a key.
//! 2. Reads are concurrent; writes are serialized, so two workers converting
//!    the same object observe a single entry.
//! 3. Eviction is driven by the host's change detection, by application id.

pub mod cache;

pub use cache::{CacheKey, ConversionCache};

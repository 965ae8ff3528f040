//! Foundation types for the Speckle object core.
//!
//! Every other crate in the workspace depends on `speckle-types`. It holds the
//! data model that gets decomposed, stored, and versioned:
//!
//! # Key Types
//!
//! - [`ObjectId`]: content-addressed identifier (domain-separated BLAKE3)
//! - [`Base`]: a self-describing node with a `speckle_type` and dynamic members
//! - [`NodeRef`]: a shared handle to a [`Base`], the edge type of object graphs
//! - [`Value`]: the member value union
//! - [`SchemaRegistry`]: static per-type decomposition metadata
//! - [`ObjectReference`]: a pointer to previously serialized content
//! - [`CancellationToken`]: cooperative cancellation for long operations

pub mod base;
pub mod cancel;
pub mod error;
pub mod hasher;
pub mod kit;
pub mod object;
pub mod reference;
pub mod schema;
pub mod value;
pub mod wire;

pub use base::{Base, NodeRef, INTERNAL_PREFIX, RESERVED_MEMBERS};
pub use cancel::CancellationToken;
pub use error::TypeError;
pub use hasher::ContentHasher;
pub use kit::{Collection, Point, SpeckleObject};
pub use object::ObjectId;
pub use reference::{ObjectReference, ProjectScope};
pub use schema::{MemberFlags, MemberSchema, SchemaRegistry, TypeSchema, DEFAULT_CHUNK_SIZE};
pub use value::Value;

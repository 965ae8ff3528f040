//! Reserved keys and discriminators of serialized record bodies.

/// Content id of the record.
pub const ID: &str = "id";
/// Type discriminator.
pub const SPECKLE_TYPE: &str = "speckle_type";
/// Host-assigned identifier; never hashed.
pub const APPLICATION_ID: &str = "applicationId";
/// Number of distinct records reachable from this one.
pub const TOTAL_CHILDREN_COUNT: &str = "totalChildrenCount";
/// Direct child id to the size of that child's own closure.
pub const CLOSURE: &str = "__closure";
/// Target of a reference object.
pub const REFERENCED_ID: &str = "referencedId";
/// Payload member of a chunk record.
pub const CHUNK_DATA: &str = "data";

/// `speckle_type` of a reference standing in for a detached record.
pub const REFERENCE_TYPE: &str = "reference";
/// `speckle_type` of a synthetic chunk record.
pub const CHUNK_TYPE: &str = "chunk";

/// Keys that hold derived data and are left out of the hash view.
pub const UNHASHED_KEYS: &[&str] = &[ID, APPLICATION_ID, TOTAL_CHILDREN_COUNT, CLOSURE];

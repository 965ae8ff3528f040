use thiserror::Error;

use speckle_types::ObjectId;

/// Errors raised while flattening or rehydrating object graphs.
///
/// All variants except [`Cancelled`](SerializerError::Cancelled) are
/// structural: they describe the data, so retrying cannot help.
#[derive(Debug, Error, PartialEq)]
pub enum SerializerError {
    #[error("cycle detected: {speckle_type} is reachable from itself")]
    CycleDetected { speckle_type: String },

    #[error("cycle detected in stored records at {0}")]
    RecordCycle(ObjectId),

    #[error("member '{member}' on {speckle_type} uses a reserved name")]
    ReservedMember { speckle_type: String, member: String },

    #[error("speckle_type '{0}' is reserved for record plumbing")]
    ReservedType(String),

    #[error("member '{member}' holds a non-finite number")]
    NonFiniteNumber { member: String },

    #[error("detached object not found: {0}")]
    MissingObject(ObjectId),

    #[error("hash mismatch: record stored as {expected} hashes to {actual}")]
    HashMismatch { expected: ObjectId, actual: ObjectId },

    #[error("{speckle_type} is missing required member '{member}'")]
    MissingRequiredMember { speckle_type: String, member: String },

    #[error("malformed record {id:?}: {reason}")]
    Malformed { id: Option<ObjectId>, reason: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl SerializerError {
    pub fn malformed(id: Option<ObjectId>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            id,
            reason: reason.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type SerializerResult<T> = Result<T, SerializerError>;

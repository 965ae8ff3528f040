use thiserror::Error;

use speckle_types::ObjectId;

/// Errors produced by transports.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("object {id} is {size} bytes, over the {max} byte limit")]
    ObjectTooLarge { id: ObjectId, size: usize, max: usize },

    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjectId, reason: String },

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("server responded {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<TransportError>,
    },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("background task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP statuses worth another attempt.
pub const RETRYABLE_STATUSES: &[u16] = &[408, 429, 500, 502, 503, 504];

impl TransportError {
    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => RETRYABLE_STATUSES.contains(status),
            Self::Request(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

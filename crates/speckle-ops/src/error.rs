use thiserror::Error;

use speckle_serializer::SerializerError;
use speckle_transport::TransportError;

/// Errors from send and receive.
///
/// Cancellation is lifted out of the lower layers into its own variant so
/// callers can tell an abort from a failure.
#[derive(Debug, Error)]
pub enum OpsError {
    #[error(transparent)]
    Serializer(SerializerError),

    #[error(transparent)]
    Transport(TransportError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("send needs at least one transport")]
    NoTransports,
}

impl OpsError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Problems with the data itself; retrying will not help.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Serializer(_))
    }
}

impl From<SerializerError> for OpsError {
    fn from(e: SerializerError) -> Self {
        match e {
            SerializerError::Cancelled => Self::Cancelled,
            other => Self::Serializer(other),
        }
    }
}

impl From<TransportError> for OpsError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Cancelled => Self::Cancelled,
            // A referenced record that no transport can produce.
            TransportError::NotFound(id) => Self::Serializer(SerializerError::MissingObject(id)),
            other => Self::Transport(other),
        }
    }
}

pub type OpsResult<T> = Result<T, OpsError>;

#[cfg(test)]
mod tests {
    use speckle_types::ObjectId;

    use super::*;

    #[test]
    fn cancellation_is_lifted() {
        assert!(OpsError::from(SerializerError::Cancelled).is_cancelled());
        assert!(OpsError::from(TransportError::Cancelled).is_cancelled());
    }

    #[test]
    fn not_found_becomes_missing_object() {
        let id = ObjectId::from_hash([4; 32]);
        let err = OpsError::from(TransportError::NotFound(id));
        assert!(err.is_structural());
        assert!(err.to_string().contains("detached object not found"));
    }

    #[test]
    fn network_errors_stay_transport_errors() {
        let err = OpsError::from(TransportError::Http {
            status: 500,
            message: "boom".into(),
        });
        assert!(matches!(err, OpsError::Transport(_)));
        assert!(!err.is_structural());
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use speckle_api::error::codes;
use speckle_api::GraphQlError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid token")]
    InvalidToken,

    #[error("not allowed to {action} on stream {stream}")]
    Forbidden { stream: String, action: String },

    #[error("stream not found: {0}")]
    StreamNotFound(String),

    #[error("branch '{branch}' not found in stream {stream}")]
    BranchNotFound { stream: String, branch: String },

    #[error("commit {commit} not found in stream {stream}")]
    CommitNotFound { stream: String, commit: String },

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("{0}")]
    BadInput(String),

    #[error("{0}")]
    Conflict(String),

    #[error("object storage error: {0}")]
    Storage(#[from] speckle_transport::TransportError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// `extensions.code` reported to GraphQL clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated | Self::InvalidToken => codes::UNAUTHENTICATED,
            Self::Forbidden { .. } => codes::FORBIDDEN,
            Self::StreamNotFound(_)
            | Self::BranchNotFound { .. }
            | Self::CommitNotFound { .. }
            | Self::UserNotFound(_) => codes::NOT_FOUND,
            Self::BadInput(_) | Self::Conflict(_) => codes::BAD_USER_INPUT,
            _ => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::StreamNotFound(_)
            | Self::BranchNotFound { .. }
            | Self::CommitNotFound { .. }
            | Self::UserNotFound(_) => StatusCode::NOT_FOUND,
            Self::BadInput(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Storage(speckle_transport::TransportError::ObjectTooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_graphql(&self) -> GraphQlError {
        GraphQlError::new(self.to_string(), self.code())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

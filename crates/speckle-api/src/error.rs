use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One entry of a GraphQL `errors` array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ErrorExtensions>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorExtensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl GraphQlError {
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: Some(ErrorExtensions {
                code: Some(code.into()),
            }),
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.code.as_deref()
    }
}

/// Well-known values of `extensions.code`.
pub mod codes {
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const BAD_USER_INPUT: &str = "BAD_USER_INPUT";
    pub const UNKNOWN_OPERATION: &str = "GRAPHQL_VALIDATION_FAILED";
}

/// Errors from the version graph client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("server reported: {}", join_messages(.0))]
    Graphql(Vec<GraphQlError>),

    #[error("server responded {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("response carried no data")]
    MissingData,

    #[error("subscription ended: {0}")]
    Subscription(String),
}

fn join_messages(errors: &[GraphQlError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ApiError {
    /// `extensions.code` of the first GraphQL error, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Graphql(errors) => errors.iter().find_map(GraphQlError::code),
            _ => None,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self.code(), Some(codes::FORBIDDEN | codes::UNAUTHENTICATED))
            || matches!(self, Self::Http { status: 401 | 403, .. })
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == Some(codes::NOT_FOUND)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_joins_every_error() {
        let err = ApiError::Graphql(vec![
            GraphQlError::new("stream not found", codes::NOT_FOUND),
            GraphQlError::new("and more", codes::BAD_USER_INPUT),
        ]);
        assert_eq!(err.to_string(), "server reported: stream not found; and more");
        assert_eq!(err.code(), Some(codes::NOT_FOUND));
        assert!(err.is_not_found());
        assert!(!err.is_forbidden());
    }

    #[test]
    fn errors_without_extensions_parse() {
        let parsed: GraphQlError = serde_json::from_str(r#"{"message":"nope"}"#).unwrap();
        assert_eq!(parsed.code(), None);
    }

    #[test]
    fn http_auth_failures_are_forbidden() {
        let err = ApiError::Http {
            status: 401,
            message: String::new(),
        };
        assert!(err.is_forbidden());
    }
}

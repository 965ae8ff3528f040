use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("expected speckle_type {expected}, found {found}")]
    UnexpectedType { expected: String, found: String },

    #[error("{speckle_type} is missing member '{member}'")]
    MissingMember { speckle_type: String, member: String },

    #[error("member '{member}' is not a {expected}")]
    WrongMemberType { member: String, expected: &'static str },
}

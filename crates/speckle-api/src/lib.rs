//! Version graph client.
//!
//! Streams hold branches, branches hold commits, and every commit points at
//! the root object id of a graph already stored through a transport. The
//! [`Client`] talks GraphQL over HTTP: each call is one request, server
//! errors come back as [`ApiError::Graphql`], and nothing is retried here.
//!
//! Live updates arrive through [`Subscription`]s, which read the server's
//! event stream and fan it out to any number of local receivers.

pub mod account;
mod branch;
pub mod client;
mod commit;
pub mod error;
pub mod models;
pub mod queries;
mod stream;
pub mod subscription;

pub use account::{Account, AccountProvider, StaticAccounts};
pub use client::{Client, GraphQlRequest, GraphQlResponse};
pub use error::{ApiError, ApiResult, ErrorExtensions, GraphQlError};
pub use models::*;
pub use subscription::Subscription;

//! Transports: interchangeable stores for content-addressed records.
//!
//! A transport maps an [`ObjectId`](speckle_types::ObjectId) to the JSON body
//! of the record it names. Three implementations ship here:
//!
//! - [`MemoryTransport`]: a `HashMap`, for tests and as a scratch target
//! - [`DiskTransport`]: sharded files under a directory, usable offline or as
//!   a write-through cache in front of a server
//! - [`ServerTransport`]: the batched HTTP object API of a collaboration server
//!
//! # Design Rules
//!
//! 1. Records are write-once: saving an id that already exists is a no-op.
//! 2. A record is retrievable only after its save has been acknowledged.
//! 3. Nothing is assumed about ordering between unrelated records.
//! 4. Transient network failures are retried here, with bounded backoff;
//!    every other error is returned to the caller untouched.

pub mod disk;
pub mod error;
pub mod memory;
pub mod record;
pub mod retry;
pub mod server;
pub mod traits;

pub use disk::{DiskConfig, DiskTransport};
pub use error::{TransportError, TransportResult};
pub use memory::MemoryTransport;
pub use record::RecordHeader;
pub use retry::RetryPolicy;
pub use server::{ServerTransport, ServerTransportConfig};
pub use traits::{CopyProgress, Transport};

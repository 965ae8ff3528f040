use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use speckle_cache::ConversionCache;
use speckle_serializer::{ClosureTable, Serializer};
use speckle_types::{NodeRef, ObjectId, ProjectScope, SchemaRegistry};

use crate::error::OpsResult;

/// Tuning for [`Operations::send`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendOptions {
    /// Records per `save_objects` call.
    ///
    /// Cancellation is checked before each batch is handed out, so this is
    /// also the cancellation granularity; `1` checks before every record.
    pub batch_size: usize,
    /// Batches in flight at once, per send.
    pub max_in_flight: usize,
    /// Scope for conversion cache entries. Without one the cache is bypassed.
    pub project: Option<ProjectScope>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_in_flight: 4,
            project: None,
        }
    }
}

/// Outcome of a successful send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReport {
    pub root_id: ObjectId,
    /// Records in the flattened closure table.
    pub total_records: usize,
    /// Nodes whose serialization was skipped thanks to the cache.
    pub cache_hits: usize,
    pub total_bytes: usize,
}

/// Entry point for sending and receiving graphs.
///
/// The type registry and the conversion cache are injected, so several
/// independent `Operations` can coexist in one process.
#[derive(Clone)]
pub struct Operations {
    pub(crate) registry: Arc<SchemaRegistry>,
    pub(crate) cache: Option<Arc<ConversionCache>>,
    pub(crate) options: SendOptions,
}

impl Operations {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            cache: None,
            options: SendOptions::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<ConversionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_options(mut self, options: SendOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn cache(&self) -> Option<&ConversionCache> {
        self.cache.as_deref()
    }

    pub fn options(&self) -> &SendOptions {
        &self.options
    }

    /// Flatten without sending, consulting the cache when a project is set.
    pub fn flatten(&self, root: &NodeRef) -> OpsResult<(ObjectId, ClosureTable)> {
        let serializer = Serializer::new(&self.registry);
        let flattened = match (&self.cache, &self.options.project) {
            (Some(cache), Some(scope)) => serializer.with_cache(cache, scope).flatten(root)?,
            _ => serializer.flatten(root)?,
        };
        Ok(flattened)
    }
}

impl Default for Operations {
    fn default() -> Self {
        Self::new(Arc::new(SchemaRegistry::with_builtin_kit()))
    }
}

impl fmt::Debug for Operations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operations")
            .field("types", &self.registry.len())
            .field("cached", &self.cache.as_ref().map(|c| c.len()))
            .field("options", &self.options)
            .finish()
    }
}

use std::sync::Arc;

use axum::http::HeaderMap;
use parking_lot::RwLock;

use crate::auth::{AuthProvider, Credentials, Identity, TokenAuth};
use crate::config::ServerConfig;
use crate::events::EventBus;
use crate::graph::{PageLimits, VersionGraph};
use crate::store::ObjectStore;

/// Shared handles every request handler gets.
///
/// The graph lock is synchronous; handlers never hold it across an await.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub graph: Arc<RwLock<VersionGraph>>,
    pub objects: Arc<ObjectStore>,
    pub events: Arc<EventBus>,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let auth = Arc::new(TokenAuth::new(&config.users));
        Self::with_auth(config, auth)
    }

    pub fn with_auth(config: ServerConfig, auth: Arc<dyn AuthProvider>) -> Self {
        let limits = PageLimits {
            default: config.default_page_limit,
            max: config.max_page_limit,
        };
        let objects = match &config.data_dir {
            Some(dir) => ObjectStore::on_disk(dir, config.max_object_bytes),
            None => ObjectStore::in_memory(config.max_object_bytes),
        };
        Self {
            graph: Arc::new(RwLock::new(VersionGraph::new(limits))),
            objects: Arc::new(objects),
            events: Arc::new(EventBus::new(config.event_capacity)),
            auth,
            config: Arc::new(config),
        }
    }

    /// Resolve the caller from the request's `Authorization` header.
    pub async fn identify(&self, headers: &HeaderMap) -> crate::error::ServerResult<Identity> {
        self.auth.authenticate(&Credentials::from_headers(headers)).await
    }
}

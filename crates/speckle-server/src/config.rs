use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Accounts accepted by bearer-token authentication.
    pub users: Vec<UserConfig>,
    /// Page size used when a query asks for zero items.
    pub default_page_limit: usize,
    /// Larger page requests are clamped to this.
    pub max_page_limit: usize,
    /// Body limit for uploads and GraphQL requests.
    pub max_request_bytes: usize,
    /// Largest single object accepted by the upload endpoint.
    pub max_object_bytes: usize,
    /// Events buffered per subscriber before it starts missing some.
    pub event_capacity: usize,
    /// Keep each stream's objects on disk under this directory. Objects
    /// live in memory when unset.
    pub data_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            users: Vec::new(),
            default_page_limit: 25,
            max_page_limit: 100,
            max_request_bytes: 100 * 1024 * 1024,
            max_object_bytes: 25_000_000,
            event_capacity: 256,
            data_dir: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub token: String,
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn with_user(mut self, id: &str, name: &str, token: &str) -> Self {
        self.users.push(UserConfig {
            id: id.to_string(),
            name: name.to_string(),
            email: None,
            token: token.to_string(),
        });
        self
    }

    fn validate(&self) -> ServerResult<()> {
        if self.max_page_limit == 0 || self.default_page_limit == 0 {
            return Err(ServerError::Config("page limits must be positive".into()));
        }
        for (i, user) in self.users.iter().enumerate() {
            if user.token.is_empty() {
                return Err(ServerError::Config(format!("user '{}' has an empty token", user.id)));
            }
            if self.users[..i].iter().any(|u| u.token == user.token || u.id == user.id) {
                return Err(ServerError::Config(format!("user '{}' is not unique", user.id)));
            }
        }
        Ok(())
    }
}

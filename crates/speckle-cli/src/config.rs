use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use speckle_api::Account;

/// Settings shared by every command that talks to a server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub server_url: String,
    pub token: Option<String>,
    /// Disk transport used as a local cache for sends and receives.
    pub cache_dir: Option<PathBuf>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3000".into(),
            token: None,
            cache_dir: None,
        }
    }
}

impl CliConfig {
    /// Read the config file when given, then apply overrides. `server` and
    /// `token` come from flags or their environment variables.
    pub fn resolve(path: Option<&Path>, server: Option<&str>, token: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };
        if let Some(server) = server {
            config.server_url = server.to_string();
        }
        if let Some(token) = token {
            config.token = Some(token.to_string());
        }
        Ok(config)
    }

    pub fn account(&self) -> anyhow::Result<Account> {
        let token = self
            .token
            .as_deref()
            .context("no API token: pass --token or set SPECKLE_TOKEN")?;
        Ok(Account::new(&self.server_url, token))
    }
}

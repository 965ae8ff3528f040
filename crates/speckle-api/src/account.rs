use std::fmt;

use serde::{Deserialize, Serialize};

/// Credentials for one server: where it lives and the bearer token to use.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub server_url: String,
    pub token: String,
}

impl Account {
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }
}

// Tokens stay out of logs.
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("server_url", &self.server_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Source of accounts, supplied by the host application.
pub trait AccountProvider: Send + Sync {
    fn default_account(&self) -> Option<Account>;

    fn account_for(&self, server_url: &str) -> Option<Account>;
}

/// A fixed list of accounts; the first one is the default.
#[derive(Clone, Debug, Default)]
pub struct StaticAccounts(pub Vec<Account>);

impl AccountProvider for StaticAccounts {
    fn default_account(&self) -> Option<Account> {
        self.0.first().cloned()
    }

    fn account_for(&self, server_url: &str) -> Option<Account> {
        let wanted = server_url.trim_end_matches('/');
        self.0.iter().find(|a| a.server_url == wanted).cloned()
    }
}

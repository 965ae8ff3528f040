use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

use speckle_api::User;

use crate::config::UserConfig;
use crate::error::{ServerError, ServerResult};

/// Who is making a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    User(User),
}

impl Identity {
    pub fn user(&self) -> ServerResult<&User> {
        match self {
            Self::User(user) => Ok(user),
            Self::Anonymous => Err(ServerError::Unauthenticated),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User(user) => Some(&user.id),
            Self::Anonymous => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Anonymous,
}

impl Credentials {
    /// Read `Authorization: Bearer <token>`. Anything else, an empty token
    /// included, is anonymous.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| Self::Bearer(token.to_string()))
            .unwrap_or(Self::Anonymous)
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;

    /// Look up a known user by id, for permission grants.
    fn find_user(&self, user_id: &str) -> Option<User>;
}

/// Bearer tokens from the server configuration.
#[derive(Debug, Default)]
pub struct TokenAuth {
    by_token: HashMap<String, User>,
}

impl TokenAuth {
    pub fn new(users: &[UserConfig]) -> Self {
        let by_token = users
            .iter()
            .map(|u| {
                let user = User {
                    id: u.id.clone(),
                    name: u.name.clone(),
                    email: u.email.clone(),
                };
                (u.token.clone(), user)
            })
            .collect();
        Self { by_token }
    }
}

#[async_trait]
impl AuthProvider for TokenAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Anonymous => Ok(Identity::Anonymous),
            Credentials::Bearer(token) => self
                .by_token
                .get(token)
                .cloned()
                .map(Identity::User)
                .ok_or(ServerError::InvalidToken),
        }
    }

    fn find_user(&self, user_id: &str) -> Option<User> {
        self.by_token.values().find(|u| u.id == user_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn auth() -> TokenAuth {
        TokenAuth::new(&[UserConfig {
            id: "u1".into(),
            name: "Ada".into(),
            email: None,
            token: "tok-1".into(),
        }])
    }

    #[test]
    fn bearer_header_is_parsed() {
        let mut headers = HeaderMap::new();
        assert_eq!(Credentials::from_headers(&headers), Credentials::Anonymous);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok-1"));
        assert_eq!(Credentials::from_headers(&headers), Credentials::Bearer("tok-1".into()));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(Credentials::from_headers(&headers), Credentials::Anonymous);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(Credentials::from_headers(&headers), Credentials::Anonymous);
    }

    #[tokio::test]
    async fn known_tokens_resolve_to_users() {
        let auth = auth();
        let id = auth.authenticate(&Credentials::Bearer("tok-1".into())).await.unwrap();
        assert_eq!(id.user_id(), Some("u1"));
        assert!(matches!(
            auth.authenticate(&Credentials::Bearer("nope".into())).await,
            Err(ServerError::InvalidToken)
        ));
        assert_eq!(auth.authenticate(&Credentials::Anonymous).await.unwrap(), Identity::Anonymous);
        assert!(Identity::Anonymous.user().is_err());
        assert_eq!(auth.find_user("u1").unwrap().name, "Ada");
    }
}

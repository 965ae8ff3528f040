use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::state::AppState;

/// Collaboration server: object storage plus the version graph.
pub struct SpeckleServer {
    state: AppState,
}

impl SpeckleServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            state: AppState::new(config),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Bind the configured address and serve until the task is dropped.
    pub async fn serve(self) -> ServerResult<()> {
        let listener = TcpListener::bind(&self.state.config.bind_addr).await?;
        self.serve_with_listener(listener).await
    }

    /// Serve on an already bound listener, e.g. port 0 in tests.
    pub async fn serve_with_listener(self, listener: TcpListener) -> ServerResult<()> {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, users = self.state.config.users.len(), "speckle server listening");
        axum::serve(listener, build_router(self.state))
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_construction() {
        let server = SpeckleServer::new(ServerConfig::default());
        assert_eq!(server.config().bind_addr, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(server.state().graph.read().stream_count(), 0);
    }

    #[tokio::test]
    async fn serves_on_an_ephemeral_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(SpeckleServer::new(ServerConfig::default()).serve_with_listener(listener));
        let stream = tokio::net::TcpStream::connect(addr).await;
        assert!(stream.is_ok());
    }
}

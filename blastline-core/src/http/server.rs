//! HTTP server implementation

use super::api::build_router;
use super::state::AppState;
use crate::config::ServerConfig;
use crate::core_engine::Engine;
use crate::shutdown::ShutdownCoordinator;
use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct HttpServer {
    router: Router,
    addr: SocketAddr,
}

impl HttpServer {
    pub fn new(engine: Arc<Engine>, config: &ServerConfig) -> Self {
        let state = Arc::new(AppState::new(engine));
        Self { router: build_router(state, config), addr: config.bind_address }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, letting in-flight requests finish
    pub async fn run(self, shutdown: Arc<ShutdownCoordinator>) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener, shutdown: Arc<ShutdownCoordinator>) -> Result<()> {
        info!(addr = %listener.local_addr()?, "HTTP server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait_for_shutdown().await })
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core_protocol::LoopbackClient;
    use std::time::Duration;

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let config = Config::default();
        let engine = Engine::start(Arc::new(LoopbackClient::paired()), &config);
        let server = HttpServer::new(engine, &config.server);
        let shutdown = Arc::new(ShutdownCoordinator::new(Duration::from_secs(1)));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let task = tokio::spawn(server.serve(listener, shutdown.clone()));

        shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap().unwrap();
    }
}

//! Server startup and binding
//!
//! Provides functionality to start the Axum server with configurable
//! host/port, and to host the in-process worker pool next to it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use valrun_core::pricing::PricerRegistry;
use valrun_core::types::OwnerId;
use valrun_runtime::{Orchestrator, Worker};

use crate::config::ServerConfig;
use crate::routes;

/// Server instance that can be started
pub struct Server {
    /// Server configuration
    config: Arc<ServerConfig>,
    /// The built router
    router: Router,
}

impl Server {
    /// Create a new server instance over an orchestrator and registry
    pub fn new(
        config: ServerConfig,
        orchestrator: Arc<Orchestrator>,
        registry: Arc<PricerRegistry>,
    ) -> Self {
        let config = Arc::new(config);
        let router = routes::build_router(config.clone(), orchestrator, registry);

        Self { config, router }
    }

    /// Get the socket address the server will bind to
    pub fn socket_addr(&self) -> SocketAddr {
        self.config
            .socket_addr()
            .parse()
            .expect("Invalid socket address")
    }

    /// Get the configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the server
    ///
    /// This is the main entry point for starting the server.
    /// It binds to the configured host/port and serves requests.
    pub async fn run(self) -> Result<(), std::io::Error> {
        let addr = self.socket_addr();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, self.router).await
    }

    /// Run the server with a specific listener
    ///
    /// This is useful for testing where you want to use a listener bound to
    /// port 0 to get a random available port.
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, self.router).await
    }
}

/// Spawn the in-process worker pool.
///
/// Each worker gets a unique owner id; all of them stop when `shutdown`
/// flips to `true`.
pub fn spawn_workers(
    orchestrator: Arc<Orchestrator>,
    registry: Arc<PricerRegistry>,
    config: &ServerConfig,
    shutdown: watch::Receiver<bool>,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..config.worker_count)
        .map(|i| {
            let worker = Worker::new(
                OwnerId::new(format!("{}-worker-{i}", hostname())),
                orchestrator.clone(),
                registry.clone(),
                config.worker.clone(),
            );
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.run(shutdown).await })
        })
        .collect()
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| format!("valrun-{}", std::process::id()))
}

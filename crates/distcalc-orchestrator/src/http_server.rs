//! HTTP Server for the Orchestrator
//!
//! Binds a TCP listener and serves the router from
//! [`http_router`](crate::http_router) with axum.

use std::net::SocketAddr;
use std::sync::Arc;

use distcalc_common::auth::AuthConfig;
use distcalc_common::DistcalcError;
use tokio::net::TcpListener;
use tracing::info;

use crate::http_router::{build_router, AppState};
use crate::orchestrator::Orchestrator;

/// HTTP server for the orchestrator.
///
/// This server:
/// - Serves the public calculator API under `/api/v1`
/// - Serves the worker pull/report API under `/internal/task`
/// - Provides a health check endpoint at `/__health`
pub struct HttpServer {
    orchestrator: Arc<Orchestrator>,
    auth: AuthConfig,
}

impl HttpServer {
    /// Creates a new HTTP server with authentication disabled.
    ///
    /// # Arguments
    /// * `orchestrator` - Arc-wrapped orchestrator instance
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            auth: AuthConfig::default(),
        }
    }

    /// Requires API keys on the public endpoints.
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Binds to `addr` and runs the server until it fails.
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "0.0.0.0:8080")
    ///
    /// # Returns
    /// - `Ok(())` - Server shut down
    /// - `Err(DistcalcError)` - Server failed to bind or run
    pub async fn run(self, addr: SocketAddr) -> Result<(), DistcalcError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DistcalcError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;

        self.run_with_listener(listener).await
    }

    /// Runs the server on an already bound listener.
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), DistcalcError> {
        let app = build_router(AppState {
            orchestrator: self.orchestrator,
            auth: Arc::new(self.auth.clone()),
        });

        info!(
            "Orchestrator HTTP server listening on {} (auth: {})",
            listener
                .local_addr()
                .map_err(|e| DistcalcError::Transport(format!("Failed to get local addr: {}", e)))?,
            self.auth
        );

        axum::serve(listener, app)
            .await
            .map_err(|e| DistcalcError::Transport(format!("Server error: {}", e)))?;

        Ok(())
    }
}

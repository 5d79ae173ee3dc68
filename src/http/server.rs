//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::auth::AuthToken;
use super::service::router;
use crate::error::{GateError, Result};
use crate::ratelimit::AdmissionController;

/// HTTP server for the admission gate.
pub struct GateServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The shared admission controller
    controller: Arc<AdmissionController>,
    /// Token required on gate routes
    token: AuthToken,
}

impl GateServer {
    /// Create a new server around a shared controller.
    pub fn new(addr: SocketAddr, controller: Arc<AdmissionController>, token: AuthToken) -> Self {
        Self {
            addr,
            controller,
            token,
        }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            GateError::Server(format!("failed to bind {}: {}", self.addr, e))
        })?;

        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            "Starting HTTP server for admission gate with graceful shutdown"
        );

        axum::serve(listener, router(self.controller, self.token))
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                GateError::Io(e)
            })
    }
}

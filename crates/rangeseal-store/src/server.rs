//! Store server implementation

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;

use crate::error::{Result, StoreError};
use crate::routes::create_router;
use crate::state::{create_shared_state, SharedState};

/// HTTP front end of the reference store
pub struct StoreServer {
    state: SharedState,
    addr: SocketAddr,
    prometheus: Option<PrometheusHandle>,
}

impl StoreServer {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            state: create_shared_state(),
            addr,
            prometheus: None,
        }
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let router = create_router(self.state, self.prometheus);

        tracing::info!("Starting store server on {}", listener.local_addr()?);

        axum::serve(listener, router)
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        Ok(())
    }

    /// Get the server state for testing
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }
}

/// Builder for StoreServer
pub struct ServerBuilder {
    addr: SocketAddr,
    metrics: bool,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            addr: ([127, 0, 0, 1], 3000).into(),
            metrics: false,
        }
    }

    pub fn addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.addr = ([0, 0, 0, 0], port).into();
        self
    }

    /// Install the global Prometheus recorder and serve `/metrics`
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics = enabled;
        self
    }

    pub fn build(self) -> Result<StoreServer> {
        let mut server = StoreServer::new(self.addr);
        if self.metrics {
            let handle = crate::metrics::init_prometheus_recorder()
                .map_err(|e| StoreError::Internal(format!("Prometheus recorder: {}", e)))?;
            server.prometheus = Some(handle);
        }
        Ok(server)
    }
}

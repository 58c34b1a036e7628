//! Proxy lifecycle: start, reload, shutdown.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Notify;
use tracing::info;

use crate::proxy::{Listener, ListenerConfig, ListenerStats, SharedRoutingTable};
use crate::routes::{RouteConfigError, RouteSource};

/// A bound proxy with its routing table and configuration source.
pub struct Gateway {
    listener: Arc<Listener>,
    routes: Arc<SharedRoutingTable>,
    source: Arc<dyn RouteSource>,
    shutdown: Notify,
}

impl Gateway {
    /// Load the initial routing table and bind the listener.
    ///
    /// Fails if the routing configuration cannot be loaded: there is no
    /// previous table to fall back on.
    pub async fn start(config: ListenerConfig, source: Arc<dyn RouteSource>) -> Result<Self> {
        let routes = SharedRoutingTable::load(source.as_ref()).with_context(|| {
            format!("Failed to load routing config from {}", source.describe())
        })?;
        let routes = Arc::new(routes);

        let bind_addr = config.bind_addr;
        let listener = Listener::bind(config, Arc::clone(&routes))
            .await
            .with_context(|| format!("Failed to bind listener on {bind_addr}"))?;

        Ok(Self {
            listener: Arc::new(listener),
            routes,
            source,
            shutdown: Notify::new(),
        })
    }

    /// Accept connections until [`shutdown`](Self::shutdown) is called.
    pub async fn serve(&self) -> io::Result<()> {
        Arc::clone(&self.listener)
            .run_until(self.shutdown.notified())
            .await
    }

    /// Re-read the routing source and publish a new generation.
    ///
    /// On failure the current generation keeps serving.
    pub fn reload(&self) -> Result<u64, RouteConfigError> {
        info!(source = %self.source.describe(), "Reloading routing table");
        self.routes.reload(self.source.as_ref())
    }

    /// Stop accepting new connections.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn routes(&self) -> &Arc<SharedRoutingTable> {
        &self.routes
    }

    pub fn stats(&self) -> &ListenerStats {
        self.listener.stats()
    }
}

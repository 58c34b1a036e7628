//! TCP listener and connection handling.
//!
//! Each accepted connection runs its own task:
//!
//! - handshake sniffing with a bounded buffer and timeout
//! - hostname routing against the current table generation
//! - rejection with a disconnect frame when the client cannot be routed
//! - bridging to the backend otherwise

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn, Instrument};

use super::backend::DEFAULT_CONNECT_TIMEOUT;
use super::bridge::{self, BridgeStats};
use super::error::SessionError;
use super::responder::{self, RejectMode, MALFORMED_REASON, NO_ROUTE_REASON};
use super::router::{RoutingDecision, SharedRoutingTable};
use super::sniffer::{HandshakeInspector, InspectResult, SnifferConfig};

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:25565";

/// Default maximum concurrent connections per listener.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10000;

/// Configuration for a listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Handshake inspection configuration.
    pub sniffer: SnifferConfig,
    /// Timeout for dialing a backend.
    pub connect_timeout: Duration,
    /// How unroutable clients are rejected.
    pub reject_mode: RejectMode,
}

impl ListenerConfig {
    /// Create a new listener configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            sniffer: SnifferConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reject_mode: RejectMode::default(),
        }
    }
}

/// Statistics for a listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// Total connections accepted.
    pub connections_accepted: AtomicU64,
    /// Total connections currently active.
    pub connections_active: AtomicU64,
    /// Total connections closed.
    pub connections_closed: AtomicU64,
    /// Connections rejected due to max limit.
    pub connections_rejected: AtomicU64,
    /// Handshakes parsed.
    pub handshakes_parsed: AtomicU64,
    /// Handshakes rejected as malformed.
    pub handshakes_malformed: AtomicU64,
    /// Clients that did not finish the handshake in time.
    pub handshakes_timed_out: AtomicU64,
    /// Hostnames with a route.
    pub routes_matched: AtomicU64,
    /// Hostnames without a route.
    pub routes_missed: AtomicU64,
    /// Backend connection successes.
    pub backend_connected: AtomicU64,
    /// Backend connection failures.
    pub backend_failed: AtomicU64,
    /// Bytes proxied to backend.
    pub bytes_to_backend: AtomicU64,
    /// Bytes proxied from backend.
    pub bytes_from_backend: AtomicU64,
}

impl ListenerStats {
    fn record_bridge(&self, stats: &BridgeStats) {
        self.bytes_to_backend
            .fetch_add(stats.bytes_to_backend, Ordering::Relaxed);
        self.bytes_from_backend
            .fetch_add(stats.bytes_from_backend, Ordering::Relaxed);
    }
}

/// A TCP listener for the proxy.
pub struct Listener {
    /// Listener configuration.
    config: ListenerConfig,
    /// The TCP listener.
    listener: TcpListener,
    /// Routing table for routing decisions.
    routes: Arc<SharedRoutingTable>,
    /// Connection semaphore for limiting concurrent connections.
    conn_semaphore: Arc<Semaphore>,
    /// Handshake inspector.
    inspector: HandshakeInspector,
    /// Statistics.
    stats: Arc<ListenerStats>,
}

impl Listener {
    /// Bind a new listener.
    pub async fn bind(config: ListenerConfig, routes: Arc<SharedRoutingTable>) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        info!(
            bind_addr = %local_addr,
            max_connections = config.max_connections,
            reject_mode = ?config.reject_mode,
            "Listener bound"
        );

        Ok(Self {
            conn_semaphore: Arc::new(Semaphore::new(config.max_connections)),
            inspector: HandshakeInspector::with_config(config.sniffer.clone()),
            listener,
            config,
            routes,
            stats: Arc::new(ListenerStats::default()),
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get listener statistics.
    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// Run the listener forever.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accept and handle connections until `shutdown` completes.
    ///
    /// Sessions already running are left to finish on their own.
    pub async fn run_until<F>(self: Arc<Self>, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let local_addr = self.listener.local_addr()?;
        info!(bind_addr = %local_addr, "Listener started");

        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    info!(bind_addr = %local_addr, "Listener stopped");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => self.spawn_session(stream, peer_addr),
                Err(e) => {
                    error!(error = %e, "Accept error");
                    // Brief sleep to avoid tight loop on persistent errors
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    fn spawn_session(self: &Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        // Try to acquire a permit
        let permit = match self.conn_semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.stats
                    .connections_rejected
                    .fetch_add(1, Ordering::Relaxed);
                warn!(peer_addr = %peer_addr, "Connection rejected: max connections reached");
                return;
            }
        };

        self.stats
            .connections_accepted
            .fetch_add(1, Ordering::Relaxed);
        self.stats
            .connections_active
            .fetch_add(1, Ordering::Relaxed);

        let listener = Arc::clone(self);

        tokio::spawn(
            async move {
                match listener.handle_connection(stream).await {
                    Ok(bridged) => {
                        debug!(
                            bytes_to_backend = bridged.bytes_to_backend,
                            bytes_from_backend = bridged.bytes_from_backend,
                            "Connection closed"
                        );
                    }
                    Err(e @ SessionError::ClientClosed { .. }) => {
                        debug!(error = %e, "Connection closed during handshake");
                    }
                    Err(e @ SessionError::Bridge(_)) | Err(e @ SessionError::Io(_)) => {
                        debug!(error = %e, "Connection error");
                    }
                    Err(e) if e.is_rejection() => {
                        warn!(error = %e, "Client rejected");
                    }
                    Err(e) => {
                        warn!(error = %e, "Connection failed");
                    }
                }

                listener
                    .stats
                    .connections_active
                    .fetch_sub(1, Ordering::Relaxed);
                listener
                    .stats
                    .connections_closed
                    .fetch_add(1, Ordering::Relaxed);
                drop(permit);
            }
            .instrument(tracing::info_span!("connection", peer = %peer_addr)),
        );
    }

    /// Handle a single connection.
    async fn handle_connection(&self, mut client: TcpStream) -> Result<BridgeStats, SessionError> {
        client.set_nodelay(true)?;

        let (handshake, initial_bytes) = match self.inspector.inspect(&mut client).await {
            InspectResult::Parsed {
                handshake,
                initial_bytes,
            } => {
                self.stats.handshakes_parsed.fetch_add(1, Ordering::Relaxed);
                (handshake, initial_bytes)
            }
            InspectResult::Malformed(e) => {
                self.stats
                    .handshakes_malformed
                    .fetch_add(1, Ordering::Relaxed);
                responder::reject(&mut client, self.config.reject_mode, MALFORMED_REASON).await;
                return Err(e.into());
            }
            InspectResult::Timeout => {
                self.stats
                    .handshakes_timed_out
                    .fetch_add(1, Ordering::Relaxed);
                return Err(SessionError::HandshakeTimeout(self.inspector.config().timeout));
            }
            InspectResult::Closed { buffered } => {
                return Err(SessionError::ClientClosed { buffered });
            }
            InspectResult::IoError(e) => return Err(e.into()),
        };

        debug!(
            hostname = %handshake.hostname,
            protocol_version = handshake.protocol_version,
            buffered = initial_bytes.len(),
            "Handshake parsed"
        );

        let backend = match self.routes.route(&handshake.hostname) {
            RoutingDecision::Matched { backend } => {
                self.stats.routes_matched.fetch_add(1, Ordering::Relaxed);
                backend
            }
            RoutingDecision::NoMatch { reason } => {
                self.stats.routes_missed.fetch_add(1, Ordering::Relaxed);
                debug!(reason = %reason, "No route match");
                responder::reject(&mut client, self.config.reject_mode, NO_ROUTE_REASON).await;
                return Err(SessionError::NoRouteFound {
                    hostname: handshake.hostname,
                });
            }
        };

        info!(
            hostname = %handshake.hostname,
            backend_addr = %backend,
            "Routing connection"
        );

        let result = bridge::bridge(
            &mut client,
            &backend,
            &initial_bytes,
            self.config.connect_timeout,
        )
        .await;

        match &result {
            Ok(bridged) => {
                self.stats.backend_connected.fetch_add(1, Ordering::Relaxed);
                self.stats.record_bridge(bridged);
            }
            Err(SessionError::BackendUnreachable { .. }) => {
                self.stats.backend_failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.backend_connected.fetch_add(1, Ordering::Relaxed);
            }
        }

        result
    }
}

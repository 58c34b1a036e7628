//! Hostname-routing TCP proxy.
//!
//! This module provides:
//! - TCP listener management
//! - Handshake sniffing to learn the virtual hostname
//! - Hostname routing against a hot-swappable table
//! - Disconnect frames for clients that cannot be routed
//! - Connection bridging
//!
//! ## Architecture
//!
//! ```text
//! Client -> Listener -> Handshake Sniffer -> Router -> Bridge -> Backend
//!                              |                |
//!                              +---- Error Responder (disconnect frame)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use proxy::{Listener, ListenerConfig, SharedRoutingTable};
//!
//! let routes = Arc::new(SharedRoutingTable::load(&source)?);
//!
//! let config = ListenerConfig::new("0.0.0.0:25565".parse()?);
//! let listener = Listener::bind(config, routes).await?;
//! Arc::new(listener).run().await?;
//! ```

mod backend;
mod bridge;
mod error;
mod listener;
mod responder;
mod router;
mod sniffer;

pub use backend::{Backend, DEFAULT_CONNECT_TIMEOUT};
pub use bridge::{bridge, splice, BridgeStats};
pub use error::{MalformedHandshake, SessionError};
pub use listener::{
    Listener, ListenerConfig, ListenerStats, DEFAULT_LISTEN_ADDR, DEFAULT_MAX_CONNECTIONS,
};
pub use responder::{reject, send_disconnect, RejectMode, MALFORMED_REASON, NO_ROUTE_REASON};
pub use router::{RouteEntry, RoutingDecision, RoutingTable, SharedRoutingTable};
pub use sniffer::{
    HandshakeInspector, HandshakeSniffer, InspectResult, SniffResult, SniffState, SnifferConfig,
    DEFAULT_HANDSHAKE_TIMEOUT, HANDSHAKE_BUFFER_CAPACITY,
};

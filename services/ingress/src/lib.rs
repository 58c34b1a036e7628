pub mod config;
pub mod gateway;
pub mod logging;
pub mod proxy;
pub mod routes;
pub mod watcher;

pub use gateway::Gateway;
pub use proxy::{
    Backend, HandshakeInspector, HandshakeSniffer, Listener, ListenerConfig, RejectMode,
    RouteEntry, RoutingDecision, RoutingTable, SharedRoutingTable, SniffResult,
};
pub use routes::{JsonFileSource, RouteConfigError, RouteSource};

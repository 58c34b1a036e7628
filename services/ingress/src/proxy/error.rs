//! Per-connection error types.

use std::io;
use std::time::Duration;

use mcgate_protocol::ProtocolError;
use thiserror::Error;

/// Why a handshake could not be accepted.
#[derive(Debug, Error)]
pub enum MalformedHandshake {
    /// Wrong packet id, VarInt overflow, bad length or bad hostname.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// The buffer filled up before a complete handshake arrived.
    #[error("handshake not complete within {capacity} bytes")]
    TooLarge { capacity: usize },

    /// Bytes were fed after the sniffer already reached a verdict.
    #[error("handshake already resolved")]
    AlreadyResolved,
}

/// Terminal outcome of a connection session other than a clean close.
///
/// Every variant is contained to its own connection.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("malformed handshake: {0}")]
    MalformedHandshake(#[from] MalformedHandshake),

    #[error("no route for hostname '{hostname}'")]
    NoRouteFound { hostname: String },

    #[error("backend {backend} unreachable: {source}")]
    BackendUnreachable {
        backend: String,
        #[source]
        source: io::Error,
    },

    #[error("bridge i/o error: {0}")]
    Bridge(#[source] io::Error),

    #[error("no handshake within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("client closed after {buffered} handshake bytes")]
    ClientClosed { buffered: usize },

    #[error("client i/o error: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    /// Whether the client was rejected before any backend was involved.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SessionError::MalformedHandshake(_) | SessionError::NoRouteFound { .. }
        )
    }
}

//! Backend endpoints.
//!
//! A backend is a downstream game server identified by host and port. The
//! host may be an IP literal or a DNS name; it is resolved on every dial.
//! Dialing is bounded by a connect timeout and never retried.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Default connect timeout for backend connections.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// A single proxy target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Backend {
    /// Hostname or IP address of the backend server.
    pub host: String,
    /// TCP port, never zero.
    pub port: u16,
}

impl Backend {
    /// Create a new backend endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Open a TCP connection to this backend.
    pub async fn connect(&self, connect_timeout: Duration) -> io::Result<TcpStream> {
        debug!(backend_addr = %self, "Connecting to backend");

        let stream = match timeout(
            connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connect timeout",
                ))
            }
        };

        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

//! Gateway configuration.
//!
//! Every option can be given as a flag or through its `MCGATE_*`
//! environment variable; flags win.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::logging::LogFormat;
use crate::proxy::{
    ListenerConfig, RejectMode, SnifferConfig, DEFAULT_MAX_CONNECTIONS, HANDSHAKE_BUFFER_CAPACITY,
};

/// Hostname-routing proxy for block-game login traffic.
#[derive(Debug, Clone, Parser)]
#[command(name = "mcgate", version, about)]
pub struct Config {
    /// Address to accept client connections on.
    #[arg(long, env = "MCGATE_LISTEN", default_value = "0.0.0.0:25565")]
    pub listen: SocketAddr,

    /// Routing file: a JSON array of `{url_name, send_url, send_port}` records.
    #[arg(long, env = "MCGATE_ROUTES", default_value = "config.json")]
    pub routes: PathBuf,

    /// Reload the routing file when it changes on disk.
    #[arg(long, env = "MCGATE_WATCH", default_value_t = true, action = ArgAction::Set)]
    pub watch: bool,

    /// Time a client has to deliver its handshake.
    #[arg(long, env = "MCGATE_HANDSHAKE_TIMEOUT_MS", default_value_t = 5000)]
    pub handshake_timeout_ms: u64,

    /// Time allowed for dialing a backend.
    #[arg(long, env = "MCGATE_CONNECT_TIMEOUT_MS", default_value_t = 2000)]
    pub connect_timeout_ms: u64,

    /// Maximum concurrent client connections.
    #[arg(long, env = "MCGATE_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,

    /// How clients that cannot be routed are turned away.
    #[arg(long, env = "MCGATE_REJECT_MODE", value_enum, default_value_t = RejectMode::Disconnect)]
    pub reject_mode: RejectMode,

    /// Verbosity shorthand: 1 = debug, 2 = info, 3 = warn. Overrides --log-level.
    #[arg(
        short,
        long,
        env = "MCGATE_VERBOSE",
        value_parser = clap::value_parser!(u8).range(1..=3)
    )]
    pub verbose: Option<u8>,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long, env = "MCGATE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, env = "MCGATE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl Config {
    /// The log level after applying `--verbose`.
    pub fn effective_log_level(&self) -> &str {
        match self.verbose {
            Some(1) => "debug",
            Some(2) => "info",
            Some(3) => "warn",
            _ => &self.log_level,
        }
    }

    pub fn listener_config(&self) -> ListenerConfig {
        let mut config = ListenerConfig::new(self.listen);
        config.max_connections = self.max_connections;
        config.connect_timeout = Duration::from_millis(self.connect_timeout_ms);
        config.reject_mode = self.reject_mode;
        config.sniffer = SnifferConfig {
            timeout: Duration::from_millis(self.handshake_timeout_ms),
            capacity: HANDSHAKE_BUFFER_CAPACITY,
        };
        config
    }
}

//! Routing configuration sources.
//!
//! The routing file is a JSON array of records:
//!
//! ```json
//! [
//!   { "url_name": "survival.example.com", "send_url": "10.0.0.5", "send_port": 25565 },
//!   { "url_name": "lobby.example.com", "port": 25566 }
//! ]
//! ```
//!
//! `send_url` defaults to `url_name`, and `port` is accepted in place of
//! `send_port`. Any invalid record rejects the whole file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::proxy::{Backend, RouteEntry};

/// Errors loading routing configuration.
#[derive(Debug, Error)]
pub enum RouteConfigError {
    /// The routing file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The routing file is not a valid JSON array of records.
    #[error("failed to parse routing config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A record parsed but has an unusable value.
    #[error("invalid route at index {index}: {reason}")]
    InvalidEntry { index: usize, reason: String },
}

/// Something that can produce a full set of route entries on demand.
pub trait RouteSource: Send + Sync {
    /// Read the current configuration.
    fn load(&self) -> Result<Vec<RouteEntry>, RouteConfigError>;

    /// Human-readable origin, for logs.
    fn describe(&self) -> String;
}

/// One record of the routing file.
#[derive(Debug, Deserialize)]
struct RouteRecord {
    url_name: String,
    #[serde(default)]
    send_url: Option<String>,
    #[serde(alias = "port")]
    send_port: i64,
}

impl RouteRecord {
    fn into_entry(self, index: usize) -> Result<RouteEntry, RouteConfigError> {
        let invalid = |reason: String| RouteConfigError::InvalidEntry { index, reason };

        if self.url_name.is_empty() {
            return Err(invalid("url_name must not be empty".to_string()));
        }

        let host = self.send_url.unwrap_or_else(|| self.url_name.clone());
        if host.is_empty() {
            return Err(invalid("send_url must not be empty".to_string()));
        }

        let port = u16::try_from(self.send_port)
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| invalid(format!("port {} out of range 1-65535", self.send_port)))?;

        Ok(RouteEntry::new(self.url_name, Backend::new(host, port)))
    }
}

/// Parse routing file contents into entries, preserving file order.
pub fn parse_routes(raw: &str) -> Result<Vec<RouteEntry>, RouteConfigError> {
    let records: Vec<RouteRecord> = serde_json::from_str(raw)?;

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| record.into_entry(index))
        .collect()
}

/// Routing configuration read from a JSON file on every load.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RouteSource for JsonFileSource {
    fn load(&self) -> Result<Vec<RouteEntry>, RouteConfigError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| RouteConfigError::Read {
            path: self.path.clone(),
            source,
        })?;

        parse_routes(&raw)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

//! Rejection of unroutable clients.
//!
//! In `disconnect` mode the client gets a login disconnect frame with a
//! reason before the socket closes, so the player sees why. In `close` mode
//! the socket is simply closed.

use std::io;

use clap::ValueEnum;
use mcgate_protocol::encode_disconnect;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Reason sent when the hostname has no backend.
pub const NO_ROUTE_REASON: &str = "No server is configured for this hostname";

/// Reason sent when the handshake cannot be parsed.
pub const MALFORMED_REASON: &str = "Invalid handshake data";

/// How rejected clients are turned away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum RejectMode {
    /// Send a disconnect frame with a reason, then close.
    #[default]
    Disconnect,
    /// Close without sending anything.
    Close,
}

/// Write a disconnect frame carrying `reason`, then shut the stream down.
pub async fn send_disconnect<W: AsyncWrite + Unpin>(stream: &mut W, reason: &str) -> io::Result<()> {
    let frame = encode_disconnect(reason);
    stream.write_all(&frame).await?;
    stream.flush().await?;
    stream.shutdown().await
}

/// Turn a client away according to `mode`.
///
/// Write errors are logged and swallowed; the client is going away anyway.
pub async fn reject<W: AsyncWrite + Unpin>(stream: &mut W, mode: RejectMode, reason: &str) {
    let result = match mode {
        RejectMode::Disconnect => send_disconnect(stream, reason).await,
        RejectMode::Close => stream.shutdown().await,
    };

    if let Err(e) = result {
        debug!(error = %e, reject_mode = ?mode, "Failed to deliver rejection");
    }
}

//! Connection bridging.
//!
//! Dials the selected backend, replays the bytes consumed while sniffing, and
//! then forwards bytes in both directions. As soon as either direction hits
//! end-of-stream or an error, both sockets are shut down: half-close is not
//! preserved.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::backend::Backend;
use super::error::SessionError;

const COPY_BUFFER_SIZE: usize = 8192;

/// Byte counts for one bridged session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Bytes written to the backend, replayed handshake bytes included.
    pub bytes_to_backend: u64,
    /// Bytes written to the client.
    pub bytes_from_backend: u64,
}

/// Connect `client` to `backend`, sending `initial_bytes` first.
pub async fn bridge(
    client: &mut TcpStream,
    backend: &Backend,
    initial_bytes: &[u8],
    connect_timeout: Duration,
) -> Result<BridgeStats, SessionError> {
    let mut upstream = backend
        .connect(connect_timeout)
        .await
        .map_err(|source| SessionError::BackendUnreachable {
            backend: backend.to_string(),
            source,
        })?;

    debug!(backend_addr = %backend, "Connected to backend");

    splice(client, &mut upstream, initial_bytes).await
}

/// Forward between two established streams until either side finishes.
pub async fn splice<C, B>(
    client: &mut C,
    backend: &mut B,
    initial_bytes: &[u8],
) -> Result<BridgeStats, SessionError>
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    if !initial_bytes.is_empty() {
        backend
            .write_all(initial_bytes)
            .await
            .map_err(SessionError::Bridge)?;
        debug!(bytes = initial_bytes.len(), "Forwarded buffered handshake bytes");
    }

    let mut stats = BridgeStats {
        bytes_to_backend: initial_bytes.len() as u64,
        bytes_from_backend: 0,
    };

    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut backend_read, mut backend_write) = tokio::io::split(backend);

    let result = {
        let to_backend = pump(&mut client_read, &mut backend_write, &mut stats.bytes_to_backend);
        let from_backend = pump(
            &mut backend_read,
            &mut client_write,
            &mut stats.bytes_from_backend,
        );

        tokio::select! {
            r = to_backend => {
                debug!("Client side finished");
                r
            }
            r = from_backend => {
                debug!("Backend side finished");
                r
            }
        }
    };

    let _ = client_write.shutdown().await;
    let _ = backend_write.shutdown().await;

    result.map(|()| stats).map_err(SessionError::Bridge)
}

/// Copy from `reader` to `writer` until end-of-stream.
async fn pump<R, W>(reader: &mut R, writer: &mut W, total: &mut u64) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        *total += n as u64;
    }
}

//! Handshake sniffing.
//!
//! Accumulates the first bytes a client sends into a bounded buffer until
//! the handshake packet can be parsed, then hands every byte read so far to
//! the bridge. Nothing is consumed: the backend sees the handshake exactly as
//! the client sent it.
//!
//! - handshake buffer: 256 bytes
//! - accumulation timeout: 5s default

use std::io;
use std::mem;
use std::time::Duration;

use mcgate_protocol::{parse_handshake, Handshake};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tracing::{debug, trace};

use super::error::MalformedHandshake;

/// Maximum prefix accumulated before giving up on a handshake.
pub const HANDSHAKE_BUFFER_CAPACITY: usize = 256;

/// Default time a client gets to deliver its handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Size of a single socket read while sniffing.
const READ_CHUNK: usize = 4096;

/// Outcome of feeding bytes to a [`HandshakeSniffer`].
#[derive(Debug)]
pub enum SniffResult {
    /// The prefix is valid so far; wait for the next read.
    Incomplete,
    /// Handshake parsed. `initial_bytes` holds everything received so far,
    /// handshake first, in arrival order.
    Parsed {
        handshake: Handshake,
        initial_bytes: Vec<u8>,
    },
    /// The client cannot be routed.
    Malformed(MalformedHandshake),
}

/// Sniffer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffState {
    Awaiting,
    Resolved,
}

/// Per-connection incremental handshake parser.
#[derive(Debug)]
pub struct HandshakeSniffer {
    buffer: Vec<u8>,
    capacity: usize,
    state: SniffState,
}

impl HandshakeSniffer {
    /// Create a sniffer with the default 256 byte window.
    pub fn new() -> Self {
        Self::with_capacity(HANDSHAKE_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
            state: SniffState::Awaiting,
        }
    }

    pub fn state(&self) -> SniffState {
        self.state
    }

    /// Bytes currently held in the handshake buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feed the bytes of one read.
    ///
    /// Bytes that do not fit the window are kept aside and, if the
    /// handshake parses, appended after the buffered prefix.
    pub fn feed(&mut self, data: &[u8]) -> SniffResult {
        if self.state == SniffState::Resolved {
            return SniffResult::Malformed(MalformedHandshake::AlreadyResolved);
        }

        let room = self.capacity - self.buffer.len();
        let (fits, surplus) = data.split_at(room.min(data.len()));
        self.buffer.extend_from_slice(fits);

        match parse_handshake(&self.buffer) {
            Ok(Some(handshake)) => {
                let mut initial_bytes = self.release();
                initial_bytes.extend_from_slice(surplus);
                SniffResult::Parsed {
                    handshake,
                    initial_bytes,
                }
            }
            Ok(None) if self.buffer.len() == self.capacity => {
                self.release();
                SniffResult::Malformed(MalformedHandshake::TooLarge {
                    capacity: self.capacity,
                })
            }
            Ok(None) => SniffResult::Incomplete,
            Err(e) => {
                self.release();
                SniffResult::Malformed(MalformedHandshake::Protocol(e))
            }
        }
    }

    /// Enter the terminal state and hand back the buffer.
    fn release(&mut self) -> Vec<u8> {
        self.state = SniffState::Resolved;
        mem::take(&mut self.buffer)
    }
}

impl Default for HandshakeSniffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for handshake inspection.
#[derive(Debug, Clone)]
pub struct SnifferConfig {
    /// Maximum time to wait for a complete handshake.
    pub timeout: Duration,
    /// Handshake buffer capacity.
    pub capacity: usize,
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            capacity: HANDSHAKE_BUFFER_CAPACITY,
        }
    }
}

/// Result of inspecting a client stream.
#[derive(Debug)]
pub enum InspectResult {
    /// Handshake parsed; forward `initial_bytes` to the backend first.
    Parsed {
        handshake: Handshake,
        initial_bytes: Vec<u8>,
    },
    /// The prefix can never become a valid handshake.
    Malformed(MalformedHandshake),
    /// The client closed before completing the handshake.
    Closed { buffered: usize },
    /// Timeout while waiting for enough data.
    Timeout,
    /// I/O error during read.
    IoError(io::Error),
}

/// Drives a [`HandshakeSniffer`] from an async stream.
pub struct HandshakeInspector {
    config: SnifferConfig,
}

impl HandshakeInspector {
    pub fn new() -> Self {
        Self {
            config: SnifferConfig::default(),
        }
    }

    pub fn with_config(config: SnifferConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SnifferConfig {
        &self.config
    }

    /// Read from `stream` until the handshake resolves, the client goes
    /// away, or the timeout expires.
    pub async fn inspect<R: AsyncRead + Unpin>(&self, stream: &mut R) -> InspectResult {
        match timeout(self.config.timeout, self.read_handshake(stream)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => InspectResult::IoError(e),
            Err(_) => InspectResult::Timeout,
        }
    }

    async fn read_handshake<R: AsyncRead + Unpin>(
        &self,
        stream: &mut R,
    ) -> io::Result<InspectResult> {
        let mut sniffer = HandshakeSniffer::with_capacity(self.config.capacity);
        let mut chunk = vec![0u8; READ_CHUNK];

        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(InspectResult::Closed {
                    buffered: sniffer.buffered(),
                });
            }
            trace!(bytes = n, "Read from client");

            match sniffer.feed(&chunk[..n]) {
                SniffResult::Incomplete => {
                    debug!(buffered = sniffer.buffered(), "Handshake incomplete");
                }
                SniffResult::Parsed {
                    handshake,
                    initial_bytes,
                } => {
                    return Ok(InspectResult::Parsed {
                        handshake,
                        initial_bytes,
                    })
                }
                SniffResult::Malformed(e) => return Ok(InspectResult::Malformed(e)),
            }
        }
    }
}

impl Default for HandshakeInspector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcgate_protocol::{encode_handshake, NEXT_STATE_LOGIN};
    use proptest::prelude::*;
    use tokio::io::AsyncWriteExt;

    fn login(hostname: &str) -> Vec<u8> {
        encode_handshake(765, hostname, 25565, NEXT_STATE_LOGIN)
    }

    fn expect_parsed(result: SniffResult) -> (Handshake, Vec<u8>) {
        match result {
            SniffResult::Parsed {
                handshake,
                initial_bytes,
            } => (handshake, initial_bytes),
            other => panic!("Expected Parsed, got {:?}", other),
        }
    }

    #[test]
    fn test_single_read() {
        let frame = login("play.test");
        let mut sniffer = HandshakeSniffer::new();

        let (handshake, initial) = expect_parsed(sniffer.feed(&frame));
        assert_eq!(handshake.hostname, "play.test");
        assert_eq!(handshake.protocol_version, 765);
        assert_eq!(initial, frame);
        assert_eq!(sniffer.state(), SniffState::Resolved);
        assert_eq!(sniffer.buffered(), 0);
    }

    #[test]
    fn test_byte_by_byte() {
        let frame = login("play.test");
        let mut sniffer = HandshakeSniffer::new();

        for byte in &frame[..frame.len() - 1] {
            assert!(matches!(
                sniffer.feed(std::slice::from_ref(byte)),
                SniffResult::Incomplete
            ));
        }

        let (handshake, initial) = expect_parsed(sniffer.feed(&frame[frame.len() - 1..]));
        assert_eq!(handshake.hostname, "play.test");
        assert_eq!(initial, frame);
    }

    #[test]
    fn test_same_read_trailing_bytes_kept_in_order() {
        let mut data = login("play.test");
        let handshake_len = data.len();
        data.extend_from_slice(b"\x0a\x00\x08Steve123");

        let mut sniffer = HandshakeSniffer::new();
        let (handshake, initial) = expect_parsed(sniffer.feed(&data));

        assert_eq!(handshake.frame_len, handshake_len);
        assert_eq!(initial, data);
    }

    #[test]
    fn test_surplus_beyond_capacity_kept() {
        let frame = login("play.test");
        let mut data = frame.clone();
        data.extend((0..600).map(|i| i as u8));

        let mut sniffer = HandshakeSniffer::new();
        let (_, initial) = expect_parsed(sniffer.feed(&data));

        assert_eq!(initial.len(), data.len());
        assert_eq!(initial, data);
    }

    #[test]
    fn test_surplus_after_partial_prefix_kept() {
        let frame = login("play.test");
        let mut rest = frame[4..].to_vec();
        rest.extend(std::iter::repeat(0xAB).take(400));

        let mut sniffer = HandshakeSniffer::new();
        assert!(matches!(sniffer.feed(&frame[..4]), SniffResult::Incomplete));
        let (_, initial) = expect_parsed(sniffer.feed(&rest));

        let mut expected = frame[..4].to_vec();
        expected.extend_from_slice(&rest);
        assert_eq!(initial, expected);
    }

    #[test]
    fn test_buffer_full_without_handshake() {
        // Declares a 300 byte packet, which can never fit the window.
        let mut data = vec![0xAC, 0x02, 0x00, 0x01];
        data.resize(HANDSHAKE_BUFFER_CAPACITY, b'x');

        let mut sniffer = HandshakeSniffer::new();
        match sniffer.feed(&data) {
            SniffResult::Malformed(MalformedHandshake::TooLarge { capacity }) => {
                assert_eq!(capacity, HANDSHAKE_BUFFER_CAPACITY)
            }
            other => panic!("Expected TooLarge, got {:?}", other),
        }
        assert_eq!(sniffer.state(), SniffState::Resolved);
        assert_eq!(sniffer.buffered(), 0);
    }

    #[test]
    fn test_no_varint_terminator() {
        let data = vec![0xFF; HANDSHAKE_BUFFER_CAPACITY];
        let mut sniffer = HandshakeSniffer::new();

        match sniffer.feed(&data) {
            SniffResult::Malformed(MalformedHandshake::Protocol(e)) => {
                assert!(e.is_varint_overflow())
            }
            other => panic!("Expected Protocol error, got {:?}", other),
        }
        assert_eq!(sniffer.buffered(), 0);
    }

    #[test]
    fn test_wrong_packet_id() {
        let mut sniffer = HandshakeSniffer::new();
        assert!(matches!(
            sniffer.feed(&[0x10, 0x7F]),
            SniffResult::Malformed(MalformedHandshake::Protocol(_))
        ));
    }

    #[test]
    fn test_feed_after_resolved() {
        let mut sniffer = HandshakeSniffer::new();
        expect_parsed(sniffer.feed(&login("a")));
        assert!(matches!(
            sniffer.feed(b"more"),
            SniffResult::Malformed(MalformedHandshake::AlreadyResolved)
        ));
    }

    #[tokio::test]
    async fn test_inspect_split_writes() {
        let frame = login("play.test");
        let (mut client, mut server) = tokio::io::duplex(64);

        let writer = {
            let frame = frame.clone();
            tokio::spawn(async move {
                for part in frame.chunks(3) {
                    client.write_all(part).await.unwrap();
                    tokio::task::yield_now().await;
                }
                client
            })
        };

        let inspector = HandshakeInspector::new();
        match inspector.inspect(&mut server).await {
            InspectResult::Parsed {
                handshake,
                initial_bytes,
            } => {
                assert_eq!(handshake.hostname, "play.test");
                assert_eq!(initial_bytes, frame);
            }
            other => panic!("Expected Parsed, got {:?}", other),
        }
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_inspect_client_closed() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0x10, 0x00]).await.unwrap();
        drop(client);

        match HandshakeInspector::new().inspect(&mut server).await {
            InspectResult::Closed { buffered } => assert_eq!(buffered, 2),
            other => panic!("Expected Closed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inspect_timeout() {
        let (_client, mut server) = tokio::io::duplex(64);
        let inspector = HandshakeInspector::with_config(SnifferConfig {
            timeout: Duration::from_millis(50),
            ..Default::default()
        });

        assert!(matches!(
            inspector.inspect(&mut server).await,
            InspectResult::Timeout
        ));
    }

    proptest! {
        #[test]
        fn prop_any_split_matches_single_read(
            hostname in "[a-z0-9.]{1,100}",
            trailing in proptest::collection::vec(any::<u8>(), 0..64),
            splits in proptest::collection::vec(1usize..16, 1..64),
        ) {
            let mut data = login(&hostname);
            data.extend_from_slice(&trailing);

            let (expected, expected_initial) = expect_parsed(HandshakeSniffer::new().feed(&data));

            let mut sniffer = HandshakeSniffer::new();
            let mut rest = &data[..];
            let mut sizes = splits.iter().cycle();
            let parsed = loop {
                let take = (*sizes.next().unwrap()).min(rest.len());
                let (chunk, tail) = rest.split_at(take);
                rest = tail;
                match sniffer.feed(chunk) {
                    SniffResult::Incomplete => prop_assert!(!rest.is_empty()),
                    SniffResult::Parsed { handshake, mut initial_bytes } => {
                        initial_bytes.extend_from_slice(rest);
                        break (handshake, initial_bytes);
                    }
                    SniffResult::Malformed(e) => panic!("unexpected malformed: {e}"),
                }
            };

            prop_assert_eq!(parsed.0, expected);
            prop_assert_eq!(parsed.1, expected_initial);
        }
    }
}

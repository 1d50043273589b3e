//! Connection Session
//!
//! One session per accepted stream. The session reads a frame, executes
//! it, writes the reply, and only then looks at the next frame.
//!
//! ## Lifecycle
//!
//! ```text
//!        accept()
//!           │
//!           ▼
//!   ┌──────────────┐  frame decoded  ┌──────────────┐
//!   │   Reading    │────────────────>│ Dispatching  │
//!   └──────────────┘                 └──────┬───────┘
//!      ▲      │                             │ reply
//!      │      │ framing error,              ▼
//!      │      │ EOF, I/O error       ┌──────────────┐
//!      │      │                      │   Writing    │
//!      │      ▼                      └──────┬───────┘
//!      │  ┌──────────┐   write failed       │
//!      │  │  Closed  │<─────────────────────┤
//!      │  └──────────┘                      │
//!      └────────────────────────────────────┘
//!                 reply flushed
//! ```
//!
//! A malformed frame is answered with `-ERR Protocol error` before the
//! session closes. A stream that ends, mid-frame or not, closes the
//! session without a reply.
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut`. The stream may deliver half a
//! frame or several frames per read; decoded frames are cut off the front
//! of the buffer one at a time.

use crate::commands::CommandHandler;
use crate::protocol::{Command, FrameDecoder, FramingError, Reply};
use bytes::{Buf, BytesMut};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Default cap on unparsed bytes held for one session (1 MiB)
pub const DEFAULT_MAX_BUFFER: usize = 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Counters shared by all sessions of a server.
///
/// A session is counted once [`Session::run`] starts and stays active until
/// `run` returns.
#[derive(Debug, Default)]
pub struct SessionStats {
    sessions_started: AtomicU64,
    sessions_active: AtomicU64,
    commands_processed: AtomicU64,
    protocol_errors: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

/// A point-in-time copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub sessions_started: u64,
    pub sessions_active: u64,
    pub commands_processed: u64,
    /// Malformed frames answered with a protocol error
    pub protocol_errors: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            commands_processed: self.commands_processed.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64, by: usize) {
    counter.fetch_add(by as u64, Ordering::Relaxed);
}

/// Holds a session in the active count until dropped.
struct ActiveSession {
    stats: Arc<SessionStats>,
}

impl ActiveSession {
    fn begin(stats: Arc<SessionStats>) -> Self {
        bump(&stats.sessions_started, 1);
        bump(&stats.sessions_active, 1);
        Self { stats }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.stats.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Per-session settings taken from the server configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Validate element length lines
    pub strict_lengths: bool,
    /// Close the session once this many unparsed bytes are buffered
    pub max_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            strict_lengths: false,
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }
}

impl SessionSettings {
    fn decoder(&self) -> FrameDecoder {
        if self.strict_lengths {
            FrameDecoder::strict()
        } else {
            FrameDecoder::new()
        }
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or truncated frame
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Client closed the stream between frames
    #[error("client disconnected")]
    ClientDisconnected,

    /// Too many bytes buffered without a complete frame
    #[error("buffer size limit exceeded")]
    BufferFull,
}

/// Drives one client stream.
pub struct Session<S> {
    /// The client stream, buffered for writes
    stream: BufWriter<S>,

    /// Peer label for logging
    peer: String,

    /// Bytes read but not yet decoded
    buffer: BytesMut,

    decoder: FrameDecoder,

    /// Command handler owning this session's store access
    handler: CommandHandler,

    max_buffer: usize,

    stats: Arc<SessionStats>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a session over an already-established stream.
    pub fn new(
        stream: S,
        peer: impl fmt::Display,
        handler: CommandHandler,
        settings: SessionSettings,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            stream: BufWriter::new(stream),
            peer: peer.to_string(),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            decoder: settings.decoder(),
            handler,
            max_buffer: settings.max_buffer,
            stats,
        }
    }

    /// Runs the session until the stream closes or fails.
    ///
    /// A client hanging up between frames is a normal end and returns `Ok`.
    /// How the session ended is logged here, once.
    pub async fn run(mut self) -> Result<(), SessionError> {
        let _active = ActiveSession::begin(Arc::clone(&self.stats));
        info!(client = %self.peer, "Client connected");

        let result = match self.main_loop().await {
            Err(SessionError::ClientDisconnected) => Ok(()),
            other => other,
        };

        match &result {
            Ok(()) => info!(client = %self.peer, "Client disconnected"),
            Err(SessionError::Framing(FramingError::StreamClosed)) => {
                debug!(client = %self.peer, "Stream closed mid-frame")
            }
            Err(SessionError::Io(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.peer, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.peer, error = %e, "Session closed"),
        }

        result
    }

    /// The read, dispatch, write loop. Only returns on error.
    async fn main_loop(&mut self) -> Result<(), SessionError> {
        loop {
            let command = match self.read_command().await {
                Ok(command) => command,
                Err(SessionError::Framing(e)) => {
                    if e.wants_reply() {
                        bump(&self.stats.protocol_errors, 1);
                        self.send_reply(&Reply::protocol_error()).await?;
                    }
                    return Err(SessionError::Framing(e));
                }
                Err(e) => return Err(e),
            };

            let reply = self.handler.execute(&command);
            bump(&self.stats.commands_processed, 1);

            self.send_reply(&reply).await?;
        }
    }

    /// Waits until a whole frame is buffered and decodes it.
    async fn read_command(&mut self) -> Result<Command, SessionError> {
        loop {
            if let Some(command) = self.try_decode()? {
                return Ok(command);
            }
            self.read_more_data().await?;
        }
    }

    /// Decodes one frame from the front of the buffer, if complete.
    fn try_decode(&mut self) -> Result<Option<Command>, SessionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.decoder.decode(&self.buffer) {
            Ok(Some((command, consumed))) => {
                self.buffer.advance(consumed);
                trace!(
                    client = %self.peer,
                    command = command.name(),
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Decoded frame"
                );
                Ok(Some(command))
            }
            Ok(None) => {
                trace!(
                    client = %self.peer,
                    buffered = self.buffer.len(),
                    "Incomplete frame, need more data"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reads more data from the stream into the buffer.
    async fn read_more_data(&mut self) -> Result<(), SessionError> {
        if self.buffer.len() >= self.max_buffer {
            return Err(SessionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            return if self.buffer.is_empty() {
                Err(SessionError::ClientDisconnected)
            } else {
                Err(FramingError::StreamClosed.into())
            };
        }

        bump(&self.stats.bytes_read, n);
        trace!(client = %self.peer, bytes = n, "Read data");

        Ok(())
    }

    /// Writes and flushes one reply.
    async fn send_reply(&mut self, reply: &Reply) -> Result<(), SessionError> {
        let bytes = reply.encode();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        bump(&self.stats.bytes_written, bytes.len());
        trace!(client = %self.peer, bytes = bytes.len(), "Sent reply");
        Ok(())
    }
}

/// Runs a session to completion. The session itself logs how it ended.
pub async fn handle_connection<S>(
    stream: S,
    peer: impl fmt::Display,
    handler: CommandHandler,
    settings: SessionSettings,
    stats: Arc<SessionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let _ = Session::new(stream, peer, handler, settings, stats)
        .run()
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StoreFactory, StoreScope};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::duplex;
    use tokio_test::io::Builder;
    use tracing::Level;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    fn handler() -> CommandHandler {
        CommandHandler::new(StoreFactory::new(StoreScope::PerConnection).open())
    }

    fn session<S>(stream: S) -> Session<S>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let stats = Arc::new(SessionStats::new());
        Session::new(stream, "test", handler(), SessionSettings::default(), stats)
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let mock = Builder::new()
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();

        session(mock).run().await.unwrap();
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let mock = Builder::new()
            .read(b"*2\r\n$4\r\nEC")
            .read(b"HO\r\n$2\r\nh")
            .read(b"i\r\n")
            .write(b"$2\r\nhi\r\n")
            .build();

        session(mock).run().await.unwrap();
    }

    #[tokio::test]
    async fn test_frames_in_one_read_answered_in_order() {
        let mock = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
            .write(b"+OK\r\n")
            .write(b"$1\r\nv\r\n")
            .build();

        session(mock).run().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_session_open() {
        let mock = Builder::new()
            .read(b"*1\r\n$3\r\nFOO\r\n")
            .write(b"-ERR unknown command 'FOO'\r\n")
            .read(b"*1\r\n$4\r\nping\r\n")
            .write(b"+PONG\r\n")
            .build();

        session(mock).run().await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_leading_byte_replies_then_closes() {
        // The PING after the bad line is never answered
        let mock = Builder::new()
            .read(b"HELLO\r\n*1\r\n$4\r\nPING\r\n")
            .write(b"-ERR Protocol error\r\n")
            .build();

        let result = session(mock).run().await;
        assert!(matches!(
            result,
            Err(SessionError::Framing(FramingError::UnexpectedFormat(_)))
        ));
    }

    #[tokio::test]
    async fn test_truncated_frame_closes_silently() {
        let mock = Builder::new().read(b"*2\r\n$3\r\nGET\r\n").build();

        let result = session(mock).run().await;
        assert!(matches!(
            result,
            Err(SessionError::Framing(FramingError::StreamClosed))
        ));
    }

    #[tokio::test]
    async fn test_immediate_close_is_clean() {
        let mock = Builder::new().build();
        assert!(session(mock).run().await.is_ok());
    }

    #[tokio::test]
    async fn test_buffer_limit() {
        let mut partial = b"*1\r\n$100\r\n".to_vec();
        partial.extend_from_slice(&[b'a'; 30]);
        let mock = Builder::new().read(&partial).build();

        let settings = SessionSettings {
            max_buffer: 16,
            ..Default::default()
        };
        let stats = Arc::new(SessionStats::new());
        let result = Session::new(mock, "test", handler(), settings, stats)
            .run()
            .await;
        assert!(matches!(result, Err(SessionError::BufferFull)));
    }

    #[tokio::test]
    async fn test_strict_lengths_reject_mismatch() {
        let mock = Builder::new()
            .read(b"*2\r\n$4\r\nECHO\r\n$1\r\nhello\r\n")
            .write(b"-ERR Protocol error\r\n")
            .build();

        let settings = SessionSettings {
            strict_lengths: true,
            ..Default::default()
        };
        let stats = Arc::new(SessionStats::new());
        let result = Session::new(mock, "test", handler(), settings, stats)
            .run()
            .await;
        assert!(matches!(
            result,
            Err(SessionError::Framing(FramingError::LengthMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_expiry_over_stream() {
        let (mut client, server) = duplex(1024);
        tokio::spawn(session(server).run());

        client
            .write_all(b"*5\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n$2\r\nPX\r\n$2\r\n10\r\n")
            .await
            .unwrap();
        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+OK\r\n");

        client.write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n").await.unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"$1\r\nv\r\n");

        tokio::time::sleep(Duration::from_millis(30)).await;

        for _ in 0..2 {
            client.write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n").await.unwrap();
            let n = client.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"$-1\r\n");
        }
    }

    #[tokio::test]
    async fn test_stats() {
        let stats = Arc::new(SessionStats::new());
        let mock = Builder::new()
            .read(b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .write(b"+PONG\r\n")
            .build();

        let session = Session::new(
            mock,
            "test",
            handler(),
            SessionSettings::default(),
            Arc::clone(&stats),
        );
        session.run().await.unwrap();

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                sessions_started: 1,
                sessions_active: 0,
                commands_processed: 2,
                protocol_errors: 0,
                bytes_read: 28,
                bytes_written: 14,
            }
        );
    }

    #[tokio::test]
    async fn test_session_counted_only_while_running() {
        let stats = Arc::new(SessionStats::new());
        let (client, server) = duplex(64);

        let session = Session::new(
            server,
            "test",
            handler(),
            SessionSettings::default(),
            Arc::clone(&stats),
        );
        assert_eq!(stats.snapshot(), StatsSnapshot::default());

        let task = tokio::spawn(session.run());
        while stats.snapshot().sessions_active == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(stats.snapshot().sessions_started, 1);

        drop(client);
        task.await.unwrap().unwrap();
        assert_eq!(stats.snapshot().sessions_active, 0);

        // Built but never run: not counted
        let (_client, server) = duplex(64);
        drop(Session::new(
            server,
            "idle",
            handler(),
            SessionSettings::default(),
            Arc::clone(&stats),
        ));
        assert_eq!(stats.snapshot().sessions_started, 1);
    }

    #[tokio::test]
    async fn test_protocol_error_counted() {
        let stats = Arc::new(SessionStats::new());
        let mock = Builder::new()
            .read(b"oops\r\n")
            .write(b"-ERR Protocol error\r\n")
            .build();

        let result = Session::new(
            mock,
            "test",
            handler(),
            SessionSettings::default(),
            Arc::clone(&stats),
        )
        .run()
        .await;

        assert!(result.is_err());
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.protocol_errors, 1);
        assert_eq!(snapshot.commands_processed, 0);
        assert_eq!(snapshot.sessions_active, 0);
    }

    /// Records the level of every event emitted while installed.
    #[derive(Clone, Default)]
    struct EventLevels(Arc<Mutex<Vec<Level>>>);

    impl<S: tracing::Subscriber> Layer<S> for EventLevels {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            self.0.lock().unwrap().push(*event.metadata().level());
        }
    }

    impl EventLevels {
        fn count(&self, level: Level) -> usize {
            self.0.lock().unwrap().iter().filter(|&&l| l == level).count()
        }

        /// Events above TRACE
        fn notable(&self) -> usize {
            self.0.lock().unwrap().iter().filter(|&&l| l != Level::TRACE).count()
        }
    }

    #[tokio::test]
    async fn test_session_end_logged_once() {
        let levels = EventLevels::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(levels.clone()));

        let mock = Builder::new()
            .read(b"HELLO\r\n")
            .write(b"-ERR Protocol error\r\n")
            .build();
        let stats = Arc::new(SessionStats::new());
        handle_connection(mock, "test", handler(), SessionSettings::default(), stats).await;

        // "Client connected" and one "Session closed"
        assert_eq!(levels.count(Level::WARN), 1);
        assert_eq!(levels.notable(), 2);
    }

    #[tokio::test]
    async fn test_buffer_full_logged_once() {
        let levels = EventLevels::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(levels.clone()));

        let mock = Builder::new().read(&[b'*'; 32]).build();
        let settings = SessionSettings {
            max_buffer: 16,
            ..Default::default()
        };
        let stats = Arc::new(SessionStats::new());
        handle_connection(mock, "test", handler(), settings, stats).await;

        assert_eq!(levels.count(Level::WARN), 1);
        assert_eq!(levels.notable(), 2);
    }
}

//! Connection Handler Module
//!
//! Each client gets its own handler task that runs in a loop, reading
//! commands and sending replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects, handler task spawned
//!        │
//!        ▼
//! 2. ┌──────────────────────────────┐
//!    │  Decode every complete       │
//!    │  command in the buffer,      │◄─┐
//!    │  execute it, send the reply  │  │
//!    └──────────────┬───────────────┘  │
//!                   ▼                  │
//!    ┌──────────────────────────────┐  │
//!    │  Read more bytes from socket │──┘
//!    └──────────────┬───────────────┘
//!                   ▼
//! 3. Client disconnects / error, task ends
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut`. TCP is a stream, so one read
//! may hold half a command or several commands. Bytes after a decoded
//! command stay in the buffer for the next decode; an incomplete command
//! waits for more input. Malformed input gets no reply: the buffer skips
//! ahead to the next line starting with `*` and decoding resumes there.
//! A bulk length that overshoots everything sent after it is incomplete,
//! not malformed, so the following commands are held as its payload.

use crate::commands::CommandHandler;
use crate::protocol::{resync_offset, Command, RespParser, RespValue};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, trace, warn};

/// Maximum size for the unparsed receive buffer (1 MiB)
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Messages dropped because they could not be decoded
    pub protocol_errors: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Client disconnected in the middle of a command
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Handles a single client connection.
///
/// Owns the stream, the receive buffer and a command handler. Generic over
/// the stream so tests can drive it without a socket.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    buffer: BytesMut,
    max_buffer_size: usize,

    command_handler: CommandHandler,
    parser: RespParser,
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            max_buffer_size: MAX_BUFFER_SIZE,
            command_handler,
            parser: RespParser::new(),
            stats,
        }
    }

    /// Overrides the receive buffer limit.
    pub fn with_max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.max_buffer_size = max_buffer_size;
        self
    }

    /// Runs the connection until the client goes away or an error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(ConnectionError::ClientDisconnected) => {
                info!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(command) = self.try_parse_command() {
                if command.is_empty() {
                    continue;
                }

                trace!(client = %self.addr, command = %command, "Executing command");
                let response = self.command_handler.execute(&command);
                self.stats.command_processed();

                self.send_response(&response).await?;
            }

            self.read_more_data().await?;
        }
    }

    /// Decodes the next command from the buffer, discarding malformed input.
    fn try_parse_command(&mut self) -> Option<Command> {
        loop {
            if self.buffer.is_empty() {
                return None;
            }

            match self.parser.parse(&self.buffer) {
                Ok(Some((command, consumed))) => {
                    self.buffer.advance(consumed);
                    trace!(
                        client = %self.addr,
                        consumed = consumed,
                        remaining = self.buffer.len(),
                        "Parsed command"
                    );
                    return Some(command);
                }
                Ok(None) => {
                    trace!(
                        client = %self.addr,
                        buffered = self.buffer.len(),
                        "Incomplete command, need more data"
                    );
                    return None;
                }
                Err(e) => {
                    let skipped = resync_offset(&self.buffer);
                    self.buffer.advance(skipped);
                    self.stats.protocol_error();
                    warn!(
                        client = %self.addr,
                        error = %e,
                        skipped = skipped,
                        "Dropping malformed message"
                    );
                }
            }
        }
    }

    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= self.max_buffer_size {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            return Err(if self.buffer.is_empty() {
                ConnectionError::ClientDisconnected
            } else {
                ConnectionError::UnexpectedEof
            });
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            response = %response,
            "Sent response"
        );
        Ok(())
    }
}

/// Runs a [`ConnectionHandler`] to completion, swallowing the errors that
/// simply mean the client went away.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::storage::StorageEngine;
    use tokio_test::io::{Builder, Mock};

    fn test_addr() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn command_handler() -> CommandHandler {
        CommandHandler::new(
            Arc::new(StorageEngine::new()),
            Arc::new(ServerConfig::default()),
        )
    }

    async fn run_mock(stream: Mock) -> (Result<(), ConnectionError>, Arc<ConnectionStats>) {
        let stats = Arc::new(ConnectionStats::new());
        let handler =
            ConnectionHandler::new(stream, test_addr(), command_handler(), Arc::clone(&stats));
        (handler.run().await, stats)
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let stream = Builder::new()
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();

        let (result, stats) = run_mock(stream).await;

        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_command_split_across_reads() {
        let stream = Builder::new()
            .read(b"*2\r\n$4\r\nEC")
            .read(b"HO\r\n$3\r\nh")
            .read(b"ey\r\n")
            .write(b"$3\r\nhey\r\n")
            .build();

        let (result, _) = run_mock(stream).await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
    }

    #[tokio::test]
    async fn test_pipelined_commands_in_one_read() {
        let stream = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
            .write(b"+OK\r\n")
            .write(b"$1\r\nv\r\n")
            .build();

        let (_, stats) = run_mock(stream).await;
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_garbage_gets_no_reply() {
        let stream = Builder::new()
            .read(b"hello\r\n")
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();

        let (result, stats) = run_mock(stream).await;

        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(stats.protocol_errors.load(Ordering::Relaxed), 1);
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_overlong_bulk_length_then_valid_command() {
        // The first message declares 10 bytes but carries 4, so it waits for
        // more input; the next message exposes it as malformed.
        let stream = Builder::new()
            .read(b"*1\r\n$10\r\nPING\r\n")
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();

        let (result, stats) = run_mock(stream).await;

        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(stats.protocol_errors.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_bulk_length_past_following_commands_waits() {
        let stream = Builder::new()
            .read(b"*1\r\n$100\r\nPING\r\n")
            .read(b"*1\r\n$4\r\nPING\r\n")
            .build();

        let (result, stats) = run_mock(stream).await;

        assert!(matches!(result, Err(ConnectionError::UnexpectedEof)));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 0);
        assert_eq!(stats.protocol_errors.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_empty_array_is_ignored() {
        let stream = Builder::new()
            .read(b"*0\r\n*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();

        let (_, stats) = run_mock(stream).await;
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_command_errors_keep_connection_open() {
        let stream = Builder::new()
            .read(b"*1\r\n$4\r\nNOPE\r\n")
            .write(b"-ERR unknown command 'NOPE'\r\n")
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();

        let (result, _) = run_mock(stream).await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
    }

    #[tokio::test]
    async fn test_eof_mid_command() {
        let stream = Builder::new().read(b"*1\r\n$4\r\nPI").build();

        let (result, stats) = run_mock(stream).await;

        assert!(matches!(result, Err(ConnectionError::UnexpectedEof)));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_buffer_limit() {
        let stream = Builder::new()
            .read(b"*1\r\n$100\r\n")
            .read(&[b'x'; 64])
            .build();
        let stats = Arc::new(ConnectionStats::new());

        let result = ConnectionHandler::new(stream, test_addr(), command_handler(), stats)
            .with_max_buffer_size(32)
            .run()
            .await;

        assert!(matches!(result, Err(ConnectionError::BufferFull)));
    }

    #[tokio::test]
    async fn test_read_error_ends_connection() {
        let stream = Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();

        let (result, stats) = run_mock(stream).await;

        assert!(matches!(result, Err(ConnectionError::IoError(_))));
        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}

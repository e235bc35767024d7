//! Connection Handler Module
//!
//! This module handles individual client connections to memkv.
//! Each client gets its own handler task that runs in a loop,
//! reading request lines and sending replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned, sends "CONNECTED"
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read request line       │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │   "quit" ─────┼──> 4.
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Dispatch command        │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read data line (store)  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Send reply              │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client quits / disconnects / error
//!        │
//!        ▼
//! 5. Handler task ends
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut` buffer. TCP is a stream, so one
//! read may hold half a line or several lines; lines are split off the front of
//! the buffer as soon as their `\n` arrives.

use crate::commands::{CommandHandler, Dispatch};
use crate::protocol::parser::{find_line_end, strip_line_terminator};
use crate::protocol::Response;
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Default cap on a single request or data line (1 MiB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Greeting written as soon as a client connects
const GREETING: &[u8] = b"CONNECTED\r\n";

/// Request line that ends the session
const QUIT: &[u8] = b"quit";

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
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

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// Generic over the stream so the same loop runs on a `TcpStream` in
/// production and on an in-memory mock in tests.
pub struct ConnectionHandler<S> {
    /// The client stream (writes are buffered, reads go to `buffer`)
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shared storage behind it)
    command_handler: CommandHandler,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    /// Longest line we are willing to buffer
    max_line_bytes: usize,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The client stream for this connection
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `stats` - Shared connection statistics
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
            command_handler,
            stats,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    /// Sets the longest line this connection will buffer.
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Runs the connection until the client quits, disconnects, or errors.
    ///
    /// A clean disconnect between requests is reported as `Ok(())`.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = match self.main_loop().await {
            Err(ConnectionError::ClientDisconnected) => Ok(()),
            other => other,
        };

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::IoError(io_err))
                if matches!(
                    io_err.kind(),
                    std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe
                ) =>
            {
                debug!(client = %self.addr, error = %io_err, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The greeting plus the read-dispatch-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        self.write_bytes(GREETING).await?;

        loop {
            let line = self.read_line().await?;

            if line.as_ref() == QUIT {
                debug!(client = %self.addr, "Client sent quit");
                return Ok(());
            }

            let response = match self.command_handler.dispatch(&line) {
                Dispatch::Ready(response) => response,
                Dispatch::AwaitData(command) => {
                    let data = self.read_line().await.map_err(|e| match e {
                        ConnectionError::ClientDisconnected => ConnectionError::UnexpectedEof,
                        other => other,
                    })?;
                    self.command_handler.complete(command, data)
                }
            };

            if response.is_error() {
                debug!(client = %self.addr, response = %response, "Request failed");
            }

            self.stats.command_processed();
            self.send_response(&response).await?;
        }
    }

    /// Reads one line, without its terminator.
    async fn read_line(&mut self) -> Result<Bytes, ConnectionError> {
        loop {
            if let Some(end) = find_line_end(&self.buffer) {
                if end + 1 > self.max_line_bytes {
                    return Err(self.line_too_long(end + 1));
                }

                let raw = self.buffer.split_to(end + 1).freeze();
                let len = strip_line_terminator(&raw).len();
                trace!(
                    client = %self.addr,
                    consumed = end + 1,
                    remaining = self.buffer.len(),
                    "Read line"
                );
                return Ok(raw.slice(..len));
            }

            self.read_more_data().await?;
        }
    }

    /// Reads more data from the stream into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        // The buffer only ever holds an unterminated line at this point
        if self.buffer.len() >= self.max_line_bytes {
            return Err(self.line_too_long(self.buffer.len()));
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            return if self.buffer.is_empty() {
                Err(ConnectionError::ClientDisconnected)
            } else {
                // Partial line in buffer
                Err(ConnectionError::UnexpectedEof)
            };
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Limit counts the line terminator.
    fn line_too_long(&self, size: usize) -> ConnectionError {
        warn!(
            client = %self.addr,
            size,
            limit = self.max_line_bytes,
            "Line length limit exceeded"
        );
        ConnectionError::LineTooLong(self.max_line_bytes)
    }

    /// Sends a reply to the client.
    async fn send_response(&mut self, response: &Response) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.write_bytes(&bytes).await?;
        trace!(client = %self.addr, response = %response, "Sent response");
        Ok(())
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected between requests
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Stream ended in the middle of a line or before a data line
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// A single line exceeded the configured limit
    #[error("Line longer than {0} bytes")]
    LineTooLong(usize),
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion. Errors are logged, never propagated: one
/// client's failure must not affect anyone else.
///
/// # Arguments
///
/// * `stream` - The client stream for this connection
/// * `addr` - The client's socket address
/// * `command_handler` - The command handler for executing commands
/// * `stats` - Shared connection statistics
/// * `max_line_bytes` - Longest line to buffer before dropping the client
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    max_line_bytes: usize,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats)
        .with_max_line_bytes(max_line_bytes);
    if let Err(e) = handler.run().await {
        debug!(client = %addr, error = %e, "Connection ended with error");
    }
}

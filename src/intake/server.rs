//! Intake Connection Handler
//!
//! The AAA server's accounting hook feeds events to the tracker over TCP,
//! one JSON object per line. Each connection gets its own task, its own
//! [`SessionTracker`], and its own store connection; nothing mutable is
//! shared between connections.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Accounting hook connects
//!        │
//!        ▼
//! 2. ┌──────────────────────────────┐
//!    │  Read bytes into buffer      │
//!    │  Split off complete lines    │
//!    │  Decode + track each event   │
//!    │  Reply one status line each  │
//!    └───────────┬──────────────────┘
//!                │ loop
//!                ▼
//! 3. Hook disconnects / error → task ends
//! ```
//!
//! The reply is always `{"result":"proceed",...}` regardless of what
//! happened internally; the accounting pipeline is never asked to reject or
//! retry a packet.

use crate::config::TrackerConfig;
use crate::store::StoreClient;
use crate::tracker::{SessionTracker, TrackerStats};
use bytes::BytesMut;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, warn};

/// Maximum size for one buffered event line (256 KB)
const MAX_LINE_SIZE: usize = 256 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for the intake listener
#[derive(Debug, Default)]
pub struct IntakeStats {
    /// Total connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total event lines received
    pub events_received: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
}

impl IntakeStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Errors that end an intake connection.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer disconnected normally
    #[error("peer disconnected")]
    Disconnected,

    /// Peer disconnected mid-line
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// A single line outgrew the buffer cap
    #[error("event line exceeds {} bytes", MAX_LINE_SIZE)]
    LineTooLong,
}

/// Handles one accounting-hook connection.
pub struct IntakeHandler {
    stream: BufWriter<TcpStream>,
    addr: SocketAddr,
    buffer: BytesMut,
    tracker: SessionTracker,
    stats: Arc<IntakeStats>,
}

impl IntakeHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        tracker: SessionTracker,
        stats: Arc<IntakeStats>,
    ) -> Self {
        stats.connection_opened();
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            tracker,
            stats,
        }
    }

    /// Runs the read-track-reply loop until the peer goes away.
    pub async fn run(mut self) -> Result<(), IntakeError> {
        debug!(peer = %self.addr, "Accounting hook connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) | Err(IntakeError::Disconnected) => {
                debug!(peer = %self.addr, "Accounting hook disconnected")
            }
            Err(e) => warn!(peer = %self.addr, error = %e, "Intake connection error"),
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), IntakeError> {
        loop {
            while let Some(line) = self.next_line()? {
                self.stats.events_received.fetch_add(1, Ordering::Relaxed);
                let reply = self.track_line(&line).await;
                self.send_reply(&reply).await?;
            }
            self.read_more_data().await?;
        }
    }

    /// Splits one complete line off the buffer, if present.
    fn next_line(&mut self) -> Result<Option<Vec<u8>>, IntakeError> {
        match self.buffer.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let mut line = self.buffer.split_to(pos + 1);
                line.truncate(pos);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                Ok(Some(line.to_vec()))
            }
            None if self.buffer.len() > MAX_LINE_SIZE => Err(IntakeError::LineTooLong),
            None => Ok(None),
        }
    }

    /// Decodes and tracks one event line, producing the reply to send.
    ///
    /// Unparseable JSON is treated exactly like a malformed event: logged
    /// at debug, counted, and answered with "proceed".
    async fn track_line(&mut self, line: &[u8]) -> String {
        let outcome = match serde_json::from_slice::<serde_json::Value>(line) {
            Ok(payload) => self.tracker.handle_event(&payload).await,
            Err(e) => {
                debug!(peer = %self.addr, error = %e, "Undecodable event line");
                crate::tracker::EventOutcome::Ignored
            }
        };
        json!({ "result": "proceed", "outcome": outcome.as_str() }).to_string()
    }

    async fn send_reply(&mut self, reply: &str) -> Result<(), IntakeError> {
        self.stream.write_all(reply.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_more_data(&mut self) -> Result<(), IntakeError> {
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            if self.buffer.is_empty() {
                return Err(IntakeError::Disconnected);
            }
            return Err(IntakeError::UnexpectedEof);
        }

        self.stats.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        Ok(())
    }
}

/// Accepts intake connections forever, one tracker task per connection.
pub async fn run_intake(
    listener: TcpListener,
    config: Arc<TrackerConfig>,
    intake_stats: Arc<IntakeStats>,
    tracker_stats: Arc<TrackerStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let client = StoreClient::new(
                    config.store_addr.clone(),
                    config.store_db,
                    config.store_timeout,
                    config.backoff_policy(),
                );
                let tracker =
                    SessionTracker::new(client, Arc::clone(&config), Arc::clone(&tracker_stats));
                let handler =
                    IntakeHandler::new(stream, addr, tracker, Arc::clone(&intake_stats));

                tokio::spawn(async move {
                    if let Err(e) = handler.run().await {
                        match e {
                            IntakeError::Disconnected => {}
                            _ => debug!(peer = %addr, error = %e, "Intake task ended with error"),
                        }
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept intake connection");
            }
        }
    }
}

impl std::fmt::Debug for IntakeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntakeHandler")
            .field("addr", &self.addr)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

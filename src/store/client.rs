//! Store Client
//!
//! A minimal client for the TTL-capable key-value cache holding the online
//! session index. One client owns one TCP connection; the accounting worker
//! that owns the client is the only caller, so there is no in-process
//! locking.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! execute()/pipeline()
//!        │
//!        ▼
//! ┌──────────────────────────┐   cooldown active   ┌──────────────────┐
//! │ connected?               ├────────────────────>│ fail fast:       │
//! │ (else connect + SELECT)  │                     │ Unavailable      │
//! └───────────┬──────────────┘                     └──────────────────┘
//!             │ write batch, read one reply per command
//!             ▼
//! ┌──────────────────────────┐   I/O error/timeout ┌──────────────────┐
//! │ replies                  ├────────────────────>│ drop connection, │
//! └──────────────────────────┘                     │ arm backoff      │
//!                                                  └──────────────────┘
//! ```
//!
//! Every I/O operation carries a fixed timeout; a timeout is treated exactly
//! like a connection failure. A RESP error reply (`-ERR ...`) is a failure
//! of that command only and leaves the connection up.

use crate::protocol::{parse_reply, ParseError, RespValue};
use crate::store::backoff::{Backoff, BackoffPolicy};
use crate::store::command::Command;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, warn};

/// Initial reply buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Errors surfaced by store calls.
///
/// All of these are non-fatal to the accounting path: callers log and move
/// on, they never propagate a store failure to the AAA server.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The client is inside its reconnect cooldown and fails fast.
    #[error("store unavailable, next attempt in {retry_in:?}")]
    Unavailable { retry_in: Duration },

    /// I/O error on connect, write, or read.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A store call exceeded its fixed timeout.
    #[error("store call timed out")]
    Timeout,

    /// The reply stream is not valid RESP.
    #[error("store protocol error: {0}")]
    Parse(#[from] ParseError),

    /// The store answered a command with an error reply.
    #[error("store error reply: {0}")]
    Server(String),

    /// The reply had the wrong type for the command that was issued.
    #[error("unexpected {got} reply to {command}")]
    UnexpectedReply {
        command: &'static str,
        got: &'static str,
    },
}

struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
}

/// Client for the session store, with reconnect backoff.
///
/// # Example
///
/// ```ignore
/// use radtrack::store::{Command, StoreClient};
/// use radtrack::store::backoff::BackoffPolicy;
/// use std::time::Duration;
///
/// let mut client = StoreClient::new(
///     "127.0.0.1:6379".to_string(),
///     0,
///     Duration::from_secs(2),
///     BackoffPolicy::default(),
/// );
/// let reply = client.execute(&Command::Ping).await?;
/// ```
pub struct StoreClient {
    addr: String,
    db: u32,
    timeout: Duration,
    conn: Option<Connection>,
    backoff: Backoff,
}

impl StoreClient {
    /// Creates a disconnected client; the first call connects lazily.
    pub fn new(addr: String, db: u32, timeout: Duration, policy: BackoffPolicy) -> Self {
        Self {
            addr,
            db,
            timeout,
            conn: None,
            backoff: Backoff::new(policy),
        }
    }

    /// Whether the client currently holds a live connection.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Executes a single command and returns its reply.
    ///
    /// An error reply from the store surfaces as [`StoreError::Server`]
    /// without tearing down the connection.
    pub async fn execute(&mut self, cmd: &Command) -> Result<RespValue, StoreError> {
        let mut replies = self.round_trip(std::slice::from_ref(cmd)).await?;
        match replies.pop() {
            Some(RespValue::Error(message)) => Err(StoreError::Server(message)),
            Some(reply) => Ok(reply),
            None => Err(StoreError::Timeout),
        }
    }

    /// Sends a batch of commands in one write and reads one reply each.
    ///
    /// Error replies stay in-band as [`RespValue::Error`] so one bad command
    /// does not discard the replies of the rest of the batch.
    pub async fn pipeline(&mut self, cmds: &[Command]) -> Result<Vec<RespValue>, StoreError> {
        if cmds.is_empty() {
            return Ok(Vec::new());
        }
        self.round_trip(cmds).await
    }

    async fn round_trip(&mut self, cmds: &[Command]) -> Result<Vec<RespValue>, StoreError> {
        self.ensure_connected().await?;

        let timeout = self.timeout;
        let Some(conn) = self.conn.as_mut() else {
            return Err(StoreError::Unavailable {
                retry_in: Duration::ZERO,
            });
        };

        match Self::exchange(conn, timeout, cmds).await {
            Ok(replies) => Ok(replies),
            Err(e) => {
                self.mark_failed(&e);
                Err(e)
            }
        }
    }

    /// Connects (and SELECTs the logical partition) if not already connected.
    async fn ensure_connected(&mut self) -> Result<(), StoreError> {
        if self.conn.is_some() {
            return Ok(());
        }

        if let Some(retry_in) = self.backoff.cooldown_remaining() {
            return Err(StoreError::Unavailable { retry_in });
        }

        let connect = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await;
        let stream = match connect {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                let delay = self.backoff.failure();
                warn!(
                    addr = %self.addr,
                    error = %e,
                    retry_ms = delay.as_millis() as u64,
                    "Store connection failed, backing off"
                );
                return Err(StoreError::Unavailable { retry_in: delay });
            }
            Err(_) => {
                let delay = self.backoff.failure();
                warn!(
                    addr = %self.addr,
                    retry_ms = delay.as_millis() as u64,
                    "Store connection timed out, backing off"
                );
                return Err(StoreError::Unavailable { retry_in: delay });
            }
        };

        let mut conn = Connection {
            stream,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
        };

        if self.db != 0 {
            let select = Command::Select(self.db);
            match Self::exchange(&mut conn, self.timeout, std::slice::from_ref(&select)).await {
                Ok(replies) if replies.first().map(RespValue::is_error) == Some(false) => {}
                Ok(replies) => {
                    let delay = self.backoff.failure();
                    warn!(
                        addr = %self.addr,
                        db = self.db,
                        reply = ?replies.first(),
                        retry_ms = delay.as_millis() as u64,
                        "Store rejected SELECT, backing off"
                    );
                    return Err(StoreError::Unavailable { retry_in: delay });
                }
                Err(e) => {
                    let delay = self.backoff.failure();
                    warn!(
                        addr = %self.addr,
                        error = %e,
                        retry_ms = delay.as_millis() as u64,
                        "Store handshake failed, backing off"
                    );
                    return Err(StoreError::Unavailable { retry_in: delay });
                }
            }
        }

        debug!(addr = %self.addr, db = self.db, "Connected to session store");
        self.conn = Some(conn);
        self.backoff.reset();
        Ok(())
    }

    /// Writes the encoded batch and collects one reply per command.
    async fn exchange(
        conn: &mut Connection,
        timeout: Duration,
        cmds: &[Command],
    ) -> Result<Vec<RespValue>, StoreError> {
        let mut wire = Vec::new();
        for cmd in cmds {
            cmd.encode_into(&mut wire);
        }

        tokio::time::timeout(timeout, conn.stream.write_all(&wire))
            .await
            .map_err(|_| StoreError::Timeout)??;

        let mut replies = Vec::with_capacity(cmds.len());
        while replies.len() < cmds.len() {
            if let Some((reply, consumed)) = parse_reply(&conn.buffer)? {
                let _ = conn.buffer.split_to(consumed);
                replies.push(reply);
                continue;
            }

            let n = tokio::time::timeout(timeout, conn.stream.read_buf(&mut conn.buffer))
                .await
                .map_err(|_| StoreError::Timeout)??;
            if n == 0 {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "store closed the connection",
                )));
            }
        }

        Ok(replies)
    }

    /// Drops the connection and arms the backoff after an in-flight failure.
    fn mark_failed(&mut self, error: &StoreError) {
        self.conn = None;
        let delay = self.backoff.failure();
        warn!(
            addr = %self.addr,
            error = %error,
            retry_ms = delay.as_millis() as u64,
            "Store call failed, connection dropped"
        );
    }
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("addr", &self.addr)
            .field("db", &self.db)
            .field("connected", &self.conn.is_some())
            .field("failures", &self.backoff.attempt())
            .finish()
    }
}

/// Interprets a reply that must be an integer (EXISTS, SCARD, SADD, ...).
///
/// Error replies and wrong shapes are logged here and surfaced as failures
/// of this call only.
pub fn expect_integer(reply: &RespValue, command: &'static str) -> Result<i64, StoreError> {
    match reply {
        RespValue::Integer(n) => Ok(*n),
        RespValue::Error(message) => Err(StoreError::Server(message.clone())),
        other => {
            error!(
                command = command,
                got = other.type_name(),
                "Unexpected reply shape from store"
            );
            Err(StoreError::UnexpectedReply {
                command,
                got: other.type_name(),
            })
        }
    }
}

/// Interprets a reply that must be an array of strings (SMEMBERS).
pub fn expect_strings(reply: RespValue, command: &'static str) -> Result<Vec<String>, StoreError> {
    if let RespValue::Error(message) = reply {
        return Err(StoreError::Server(message));
    }
    let got = reply.type_name();
    reply.into_string_vec().ok_or_else(|| {
        error!(
            command = command,
            got = got,
            "Unexpected reply shape from store"
        );
        StoreError::UnexpectedReply { command, got }
    })
}

//! Store Client Module
//!
//! Everything the tracker needs to talk to the external session store:
//!
//! - `command`: the fixed vocabulary of primitive cache operations
//! - `client`: one-connection client with `execute` and `pipeline`
//! - `backoff`: exponential reconnect backoff with jitter
//!
//! ## Resilience
//!
//! The client never blocks the accounting path on a dead cache. Any I/O
//! failure or timeout drops the connection and arms a cooldown; calls made
//! during the cooldown fail fast with [`StoreError::Unavailable`]. Callers
//! treat every store error as non-fatal.

pub mod backoff;
pub mod client;
pub mod command;

// Re-export commonly used types
pub use backoff::{Backoff, BackoffPolicy};
pub use client::{expect_integer, expect_strings, StoreClient, StoreError};
pub use command::Command;

//! # radtrack - Online-Session Tracker for RADIUS Accounting
//!
//! radtrack consumes RADIUS accounting events (Start / Interim-Update /
//! Stop / Accounting-On / Accounting-Off) and maintains a low-latency,
//! eventually consistent index of active subscriber sessions in an external
//! Redis-dialect cache. It exists to answer "who is online right now, on
//! which device, for how long, using how much traffic" at high query rates
//! without ever scanning the durable accounting table.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              radtrack                                │
//! │                                                                      │
//! │  ┌───────────┐    ┌───────────┐    ┌───────────────┐                 │
//! │  │  Intake   │───>│  Event    │───>│   Session     │                 │
//! │  │ (JSON/TCP)│    │  Decoder  │    │   Tracker     │                 │
//! │  └───────────┘    └───────────┘    └──────┬────────┘                 │
//! │                                          │ pipelined batch           │
//! │                                          ▼                           │
//! │  ┌────────────┐   ┌──────────────────────────────────────────────┐   │
//! │  │   Lazy     │   │               StoreClient                    │   │
//! │  │  Janitor   │──>│   RESP over TCP, reconnect backoff, fail     │   │
//! │  │ (sampled)  │   │   fast while the cache is unreachable        │   │
//! │  └────────────┘   └──────────────────────┬───────────────────────┘   │
//! │                                          │                           │
//! └──────────────────────────────────────────┼───────────────────────────┘
//!                                            ▼
//!                                  TTL-capable key-value cache
//! ```
//!
//! ## Data model
//!
//! - `session:{nas}:{sessionId}` - hash, one per live session, with a TTL
//!   so sessions whose Stop was lost expire on their own
//! - `user:sessions:{username}` / `nas:sessions:{nas}` - sets of session
//!   keys; membership is advisory and pruned lazily
//! - `online:users` - usernames with at least one indexed session
//! - `online:count:sessions` / `online:count:users` - O(1) counters kept by
//!   increment/decrement, never by aggregation
//!
//! ## Design Highlights
//!
//! ### Never block the accounting path
//!
//! Every public entry point returns a "proceed" signal no matter what went
//! wrong internally. A dead cache costs one fast-failing call per event
//! while the reconnect backoff cools down; it never costs an accounting
//! reply.
//!
//! ### Lazy reconciliation instead of transactions
//!
//! A record plus two indices plus two counters are updated with independent
//! atomic primitives, not a transaction. Indices may briefly point at dead
//! sessions; the janitor prunes them on the next Stop, on sampled
//! Interim-Updates, and during NAS-wide teardowns.
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP wire types and the incremental reply parser
//! - [`store`]: command vocabulary, store client, reconnect backoff
//! - [`event`]: typed decoding of accounting payloads
//! - [`tracker`]: the lifecycle state machine and the index janitor
//! - [`intake`]: the newline-delimited JSON listener
//! - [`config`]: the `RADTRACK_*` environment surface

pub mod config;
pub mod event;
pub mod intake;
pub mod protocol;
pub mod store;
pub mod tracker;

// Re-export commonly used types for convenience
pub use config::{ConfigError, TrackerConfig};
pub use event::{AccountingEvent, AcctStatusType, DecodeError};
pub use intake::{run_intake, IntakeStats};
pub use protocol::{ParseError, RespValue};
pub use store::{BackoffPolicy, Command, StoreClient, StoreError};
pub use tracker::{EventOutcome, SessionTracker, TrackerStats};

/// Version of radtrack
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

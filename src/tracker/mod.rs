//! Session Tracker Module
//!
//! The derived view of "who is online right now" and the machinery that
//! keeps it current:
//!
//! - `keys`: the cache key schema
//! - `handler`: the per-event lifecycle state machine
//! - `janitor`: lazy pruning of stale index members
//!
//! ## Consistency model
//!
//! Multi-key updates are never transactional. Each primitive store
//! operation is atomic on its own; the aggregate (record + two indices +
//! two counters) is an eventually consistent view, reconciled by the
//! janitor the next time the affected user is touched. Counters are
//! maintained by increment and decrement only, never recomputed from set
//! cardinality.

pub mod handler;
pub mod janitor;
pub mod keys;

// Re-export commonly used types
pub use handler::{EventOutcome, SessionTracker, TrackerStats};
pub use janitor::{sweep, SweepOutcome};

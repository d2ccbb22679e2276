//! Accounting Event Module
//!
//! Turns loosely typed accounting payloads from the AAA server into the
//! fixed [`AccountingEvent`] record the lifecycle handler consumes. Events
//! that cannot identify a session (or, for NAS-wide events, a NAS) decode to
//! a [`DecodeError`] and are dropped before any store work happens.

pub mod decoder;

// Re-export commonly used types
pub use decoder::{AccountingEvent, AcctStatusType, DecodeError};

//! Intake Module
//!
//! The TCP surface the AAA server's accounting hook talks to: newline
//! delimited JSON events in, one `{"result":"proceed"}` status line out per
//! event. Each connection runs in its own task with its own store client,
//! mirroring the one-worker-one-connection model of the accounting server
//! itself.

pub mod server;

// Re-export commonly used types
pub use server::{run_intake, IntakeError, IntakeHandler, IntakeStats};

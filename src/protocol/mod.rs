//! RESP Protocol Implementation
//!
//! The session store speaks the Redis Serialization Protocol (RESP). This
//! module provides the client half of it:
//!
//! - `types`: the `RespValue` enum and wire serialization
//! - `parser`: incremental parsing of server replies from a stream buffer
//!
//! Commands are serialized as RESP arrays of bulk strings; replies come back
//! as any RESP type. The parser is incremental so the store client can read
//! pipelined reply batches off a TCP stream fragment by fragment.

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_reply, ParseError, ParseResult};
pub use types::RespValue;

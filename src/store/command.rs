//! Store Command Vocabulary
//!
//! The tracker issues a fixed, small set of primitive cache operations:
//! hash-field writes and reads, set membership updates, existence checks,
//! atomic counters, and key expiry. Each command serializes as a RESP array
//! of bulk strings, either alone or as part of a pipelined batch.

use crate::protocol::types::{prefix, CRLF};

/// One primitive operation against the session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Liveness probe, used after connecting.
    Ping,
    /// Selects the configured logical partition.
    Select(u32),
    /// Writes all fields of a hash in one call.
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Reads a single hash field; replies null when absent.
    HGet { key: String, field: String },
    /// Deletes a key.
    Del(String),
    /// Checks key existence; replies 1 or 0.
    Exists(String),
    /// Adds a member to a set; replies with the number actually added.
    SAdd { key: String, member: String },
    /// Removes a member from a set; replies with the number removed.
    SRem { key: String, member: String },
    /// Set cardinality.
    SCard(String),
    /// All members of a set.
    SMembers(String),
    /// Atomic increment by one.
    Incr(String),
    /// Atomic increment by a delta.
    IncrBy(String, i64),
    /// Atomic decrement by one.
    Decr(String),
    /// Atomic decrement by a delta.
    DecrBy(String, i64),
    /// Sets a key's TTL in seconds.
    Expire { key: String, seconds: u64 },
}

impl Command {
    /// The wire name of the command, also used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Select(_) => "SELECT",
            Command::HSet { .. } => "HSET",
            Command::HGet { .. } => "HGET",
            Command::Del(_) => "DEL",
            Command::Exists(_) => "EXISTS",
            Command::SAdd { .. } => "SADD",
            Command::SRem { .. } => "SREM",
            Command::SCard(_) => "SCARD",
            Command::SMembers(_) => "SMEMBERS",
            Command::Incr(_) => "INCR",
            Command::IncrBy(_, _) => "INCRBY",
            Command::Decr(_) => "DECR",
            Command::DecrBy(_, _) => "DECRBY",
            Command::Expire { .. } => "EXPIRE",
        }
    }

    /// Serializes the command into `buf` as a RESP array of bulk strings.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Command::Ping => encode_array(buf, &["PING"]),
            Command::Select(db) => encode_array(buf, &["SELECT", &db.to_string()]),
            Command::HSet { key, fields } => {
                let mut parts: Vec<&str> = Vec::with_capacity(2 + fields.len() * 2);
                parts.push("HSET");
                parts.push(key);
                for (field, value) in fields {
                    parts.push(field);
                    parts.push(value);
                }
                encode_array(buf, &parts);
            }
            Command::HGet { key, field } => encode_array(buf, &["HGET", key, field]),
            Command::Del(key) => encode_array(buf, &["DEL", key]),
            Command::Exists(key) => encode_array(buf, &["EXISTS", key]),
            Command::SAdd { key, member } => encode_array(buf, &["SADD", key, member]),
            Command::SRem { key, member } => encode_array(buf, &["SREM", key, member]),
            Command::SCard(key) => encode_array(buf, &["SCARD", key]),
            Command::SMembers(key) => encode_array(buf, &["SMEMBERS", key]),
            Command::Incr(key) => encode_array(buf, &["INCR", key]),
            Command::IncrBy(key, delta) => encode_array(buf, &["INCRBY", key, &delta.to_string()]),
            Command::Decr(key) => encode_array(buf, &["DECR", key]),
            Command::DecrBy(key, delta) => encode_array(buf, &["DECRBY", key, &delta.to_string()]),
            Command::Expire { key, seconds } => {
                encode_array(buf, &["EXPIRE", key, &seconds.to_string()])
            }
        }
    }

    /// Serializes the command to a standalone byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }
}

/// Writes `*<n>\r\n` followed by one `$<len>\r\n<arg>\r\n` frame per argument.
fn encode_array(buf: &mut Vec<u8>, args: &[&str]) {
    buf.push(prefix::ARRAY);
    buf.extend_from_slice(args.len().to_string().as_bytes());
    buf.extend_from_slice(CRLF);
    for arg in args {
        buf.push(prefix::BULK_STRING);
        buf.extend_from_slice(arg.len().to_string().as_bytes());
        buf.extend_from_slice(CRLF);
        buf.extend_from_slice(arg.as_bytes());
        buf.extend_from_slice(CRLF);
    }
}

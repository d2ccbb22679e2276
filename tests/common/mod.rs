//! In-memory RESP store for integration tests.
//!
//! Implements just enough of the store's command vocabulary (strings with
//! counters, hashes, sets, EXPIRE bookkeeping) to exercise the tracker end
//! to end over a real TCP connection. Tests hold a handle to the backing
//! state so they can inspect keys directly and expire Session Records out
//! of band, the way a real TTL would.

#![allow(dead_code)]

use radtrack::protocol::{parse_reply, RespValue};
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// One stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    /// Seconds recorded by the most recent EXPIRE on this key.
    pub ttl_secs: Option<u64>,
}

/// The whole keyspace, shared between the server task and the test.
#[derive(Debug, Default)]
pub struct StoreState {
    pub entries: HashMap<String, Entry>,
}

impl StoreState {
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Simulates TTL expiry of a key without a Stop event.
    pub fn expire_now(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn int_value(&self, key: &str) -> i64 {
        match self.entries.get(key) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn set_members(&self, key: &str) -> Vec<String> {
        match self.entries.get(key) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => members.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn hash_field(&self, key: &str, field: &str) -> Option<String> {
        match self.entries.get(key) {
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => fields.get(field).cloned(),
            _ => None,
        }
    }

    pub fn ttl_secs(&self, key: &str) -> Option<u64> {
        self.entries.get(key).and_then(|entry| entry.ttl_secs)
    }
}

/// Handle to a running mini store.
pub struct MiniStore {
    pub addr: SocketAddr,
    pub state: Arc<Mutex<StoreState>>,
    shutdown: Arc<AtomicBool>,
    accept_task: JoinHandle<()>,
}

impl MiniStore {
    /// Binds on an ephemeral port and starts serving.
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener)
    }

    /// Binds on a specific address; used by reconnect tests.
    pub async fn spawn_on(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        Self::serve(listener)
    }

    fn serve(listener: TcpListener) -> Self {
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(StoreState::default()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(&state);
        let stop = Arc::clone(&shutdown);

        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_connection(stream, Arc::clone(&shared), Arc::clone(&stop)));
            }
        });

        Self {
            addr,
            state,
            shutdown,
            accept_task,
        }
    }

    pub fn addr_string(&self) -> String {
        self.addr.to_string()
    }

    /// Stops accepting and makes every open connection drop on next read.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.accept_task.abort();
    }

    /// Runs a closure against the backing state.
    pub fn with_state<T>(&self, f: impl FnOnce(&mut StoreState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    state: Arc<Mutex<StoreState>>,
    shutdown: Arc<AtomicBool>,
) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        buffer.extend_from_slice(&chunk[..n]);

        let mut replies = Vec::new();
        loop {
            match parse_reply(&buffer) {
                Ok(Some((value, consumed))) => {
                    buffer.drain(..consumed);
                    let args = command_args(value);
                    let reply = apply(&args, &mut state.lock().unwrap());
                    reply.serialize_into(&mut replies);
                }
                Ok(None) => break,
                Err(_) => return,
            }
        }

        if !replies.is_empty() && stream.write_all(&replies).await.is_err() {
            return;
        }
    }
}

fn command_args(value: RespValue) -> Vec<String> {
    match value {
        RespValue::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

fn apply(args: &[String], state: &mut StoreState) -> RespValue {
    let Some(name) = args.first() else {
        return RespValue::Error("ERR empty command".to_string());
    };

    match name.to_ascii_uppercase().as_str() {
        "PING" => RespValue::SimpleString("PONG".to_string()),
        "SELECT" => RespValue::SimpleString("OK".to_string()),
        "HSET" => {
            let key = &args[1];
            let fields = match state
                .entries
                .entry(key.clone())
                .or_insert_with(|| Entry {
                    value: Value::Hash(HashMap::new()),
                    ttl_secs: None,
                }) {
                Entry {
                    value: Value::Hash(fields),
                    ..
                } => fields,
                _ => return RespValue::Error("WRONGTYPE".to_string()),
            };
            let mut added = 0;
            for pair in args[2..].chunks(2) {
                if pair.len() == 2 && fields.insert(pair[0].clone(), pair[1].clone()).is_none() {
                    added += 1;
                }
            }
            RespValue::Integer(added)
        }
        "HGET" => match state.entries.get(&args[1]) {
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => fields
                .get(&args[2])
                .map(|v| RespValue::bulk_string(v.clone()))
                .unwrap_or(RespValue::Null),
            _ => RespValue::Null,
        },
        "DEL" => {
            let removed = state.entries.remove(&args[1]).is_some();
            RespValue::Integer(removed as i64)
        }
        "EXISTS" => RespValue::Integer(state.entries.contains_key(&args[1]) as i64),
        "SADD" => {
            let members = match state
                .entries
                .entry(args[1].clone())
                .or_insert_with(|| Entry {
                    value: Value::Set(BTreeSet::new()),
                    ttl_secs: None,
                }) {
                Entry {
                    value: Value::Set(members),
                    ..
                } => members,
                _ => return RespValue::Error("WRONGTYPE".to_string()),
            };
            RespValue::Integer(members.insert(args[2].clone()) as i64)
        }
        "SREM" => {
            let mut removed = false;
            let mut now_empty = false;
            if let Some(Entry {
                value: Value::Set(members),
                ..
            }) = state.entries.get_mut(&args[1])
            {
                removed = members.remove(&args[2]);
                now_empty = members.is_empty();
            }
            // Empty sets do not exist, matching the real store.
            if now_empty {
                state.entries.remove(&args[1]);
            }
            RespValue::Integer(removed as i64)
        }
        "SCARD" => match state.entries.get(&args[1]) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => RespValue::Integer(members.len() as i64),
            _ => RespValue::Integer(0),
        },
        "SMEMBERS" => match state.entries.get(&args[1]) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => RespValue::Array(
                members
                    .iter()
                    .map(|m| RespValue::bulk_string(m.clone()))
                    .collect(),
            ),
            _ => RespValue::Array(Vec::new()),
        },
        "INCR" => adjust_counter(state, &args[1], 1),
        "INCRBY" => adjust_counter(state, &args[1], args[2].parse().unwrap_or(0)),
        "DECR" => adjust_counter(state, &args[1], -1),
        "DECRBY" => adjust_counter(state, &args[1], -args[2].parse().unwrap_or(0)),
        "EXPIRE" => match state.entries.get_mut(&args[1]) {
            Some(entry) => {
                entry.ttl_secs = args[2].parse().ok();
                RespValue::Integer(1)
            }
            None => RespValue::Integer(0),
        },
        other => RespValue::Error(format!("ERR unknown command '{}'", other)),
    }
}

fn adjust_counter(state: &mut StoreState, key: &str, delta: i64) -> RespValue {
    let entry = state.entries.entry(key.to_string()).or_insert_with(|| Entry {
        value: Value::Str("0".to_string()),
        ttl_secs: None,
    });
    match &mut entry.value {
        Value::Str(s) => {
            let current: i64 = s.parse().unwrap_or(0);
            let next = current + delta;
            *s = next.to_string();
            RespValue::Integer(next)
        }
        _ => RespValue::Error("WRONGTYPE".to_string()),
    }
}

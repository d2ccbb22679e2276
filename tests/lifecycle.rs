//! End-to-end lifecycle tests: tracker + store client against the
//! in-memory test store, driven by JSON accounting payloads.

mod common;

use common::MiniStore;
use radtrack::config::TrackerConfig;
use radtrack::store::StoreClient;
use radtrack::tracker::{self, EventOutcome, SessionTracker, TrackerStats};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const SESSIONS: &str = "online:count:sessions";
const USERS: &str = "online:count:users";
const ONLINE: &str = "online:users";

fn test_config(store: &MiniStore) -> TrackerConfig {
    TrackerConfig {
        store_addr: store.addr_string(),
        default_ttl: Duration::from_secs(120),
        ttl_margin: Duration::from_secs(60),
        janitor_interval: 2,
        store_timeout: Duration::from_secs(1),
        ..Default::default()
    }
}

fn tracker_for(store: &MiniStore) -> SessionTracker {
    let config = Arc::new(test_config(store));
    let client = StoreClient::new(
        config.store_addr.clone(),
        config.store_db,
        config.store_timeout,
        config.backoff_policy(),
    );
    SessionTracker::new(client, config, Arc::new(TrackerStats::new()))
}

fn client_for(store: &MiniStore) -> StoreClient {
    let config = test_config(store);
    StoreClient::new(
        config.store_addr.clone(),
        config.store_db,
        config.store_timeout,
        config.backoff_policy(),
    )
}

fn start(user: &str, session: &str, nas: &str, interim: u64) -> Value {
    json!({
        "Acct-Status-Type": "Start",
        "Acct-Session-Id": session,
        "User-Name": user,
        "NAS-IP-Address": nas,
        "Framed-IP-Address": "100.64.0.7",
        "Acct-Interim-Interval": interim,
    })
}

fn interim(user: &str, session: &str, nas: &str, time: u64, input: u64, output: u64) -> Value {
    json!({
        "Acct-Status-Type": "Interim-Update",
        "Acct-Session-Id": session,
        "User-Name": user,
        "NAS-IP-Address": nas,
        "Acct-Session-Time": time,
        "Acct-Input-Octets": input,
        "Acct-Output-Octets": output,
        "Acct-Interim-Interval": 60,
    })
}

fn stop(user: &str, session: &str, nas: &str, time: u64) -> Value {
    json!({
        "Acct-Status-Type": "Stop",
        "Acct-Session-Id": session,
        "User-Name": user,
        "NAS-IP-Address": nas,
        "Acct-Session-Time": time,
        "Acct-Terminate-Cause": "User-Request",
    })
}

fn nas_reset(nas: &str) -> Value {
    json!({
        "Acct-Status-Type": "Accounting-On",
        "NAS-IP-Address": nas,
    })
}

#[tokio::test]
async fn test_start_stop_symmetry() {
    let store = MiniStore::spawn().await;
    let mut tracker = tracker_for(&store);

    let outcome = tracker.handle_event(&start("alice", "S1", "10.0.0.1", 60)).await;
    assert_eq!(outcome, EventOutcome::Recorded);

    let skey = "session:10.0.0.1:S1";
    store.with_state(|state| {
        assert!(state.contains(skey));
        assert_eq!(state.set_members("user:sessions:alice"), vec![skey]);
        assert_eq!(state.set_members("nas:sessions:10.0.0.1"), vec![skey]);
        assert_eq!(state.set_members(ONLINE), vec!["alice"]);
        assert_eq!(state.int_value(SESSIONS), 1);
        assert_eq!(state.int_value(USERS), 1);
    });

    let outcome = tracker.handle_event(&stop("alice", "S1", "10.0.0.1", 120)).await;
    assert_eq!(outcome, EventOutcome::Recorded);

    store.with_state(|state| {
        assert!(!state.contains(skey));
        assert!(state.set_members("user:sessions:alice").is_empty());
        assert!(state.set_members("nas:sessions:10.0.0.1").is_empty());
        assert!(state.set_members(ONLINE).is_empty());
        assert_eq!(state.int_value(SESSIONS), 0);
        assert_eq!(state.int_value(USERS), 0);
    });
}

#[tokio::test]
async fn test_idempotent_interim() {
    let store = MiniStore::spawn().await;
    let mut tracker = tracker_for(&store);

    tracker.handle_event(&start("alice", "S1", "10.0.0.1", 60)).await;
    tracker
        .handle_event(&interim("alice", "S1", "10.0.0.1", 60, 1_000_000, 500_000))
        .await;

    let snapshot = store.with_state(|state| {
        (
            state.hash_field("session:10.0.0.1:S1", "inputBytes"),
            state.set_members("user:sessions:alice"),
            state.set_members("nas:sessions:10.0.0.1"),
            state.int_value(SESSIONS),
            state.int_value(USERS),
        )
    });

    // The same interim again must change nothing.
    tracker
        .handle_event(&interim("alice", "S1", "10.0.0.1", 60, 1_000_000, 500_000))
        .await;

    store.with_state(|state| {
        assert_eq!(
            state.hash_field("session:10.0.0.1:S1", "inputBytes"),
            snapshot.0
        );
        assert_eq!(state.set_members("user:sessions:alice"), snapshot.1);
        assert_eq!(state.set_members("nas:sessions:10.0.0.1"), snapshot.2);
        assert_eq!(state.int_value(SESSIONS), snapshot.3);
        assert_eq!(state.int_value(USERS), snapshot.4);
        assert_eq!(
            state.hash_field("session:10.0.0.1:S1", "sessionTimeSeconds"),
            Some("60".to_string())
        );
    });
}

#[tokio::test]
async fn test_duplicate_start_counts_once() {
    let store = MiniStore::spawn().await;
    let mut tracker = tracker_for(&store);

    tracker.handle_event(&start("alice", "S1", "10.0.0.1", 60)).await;
    tracker.handle_event(&start("alice", "S1", "10.0.0.1", 60)).await;

    store.with_state(|state| {
        assert_eq!(state.int_value(SESSIONS), 1);
        assert_eq!(state.int_value(USERS), 1);
    });
}

#[tokio::test]
async fn test_double_stop_decrements_once() {
    let store = MiniStore::spawn().await;
    let mut tracker = tracker_for(&store);

    tracker.handle_event(&start("alice", "S1", "10.0.0.1", 60)).await;
    tracker.handle_event(&stop("alice", "S1", "10.0.0.1", 120)).await;
    tracker.handle_event(&stop("alice", "S1", "10.0.0.1", 120)).await;

    store.with_state(|state| {
        assert_eq!(state.int_value(SESSIONS), 0);
        assert_eq!(state.int_value(USERS), 0);
    });
}

#[tokio::test]
async fn test_janitor_converges_stale_members() {
    let store = MiniStore::spawn().await;
    let mut tracker = tracker_for(&store);

    // Three live sessions for bob...
    for session in ["S1", "S2", "S3"] {
        tracker.handle_event(&start("bob", session, "10.0.0.1", 60)).await;
    }
    // ...two of which expire via TTL, not via Stop.
    store.with_state(|state| {
        state.expire_now("session:10.0.0.1:S1");
        state.expire_now("session:10.0.0.1:S2");
    });

    let mut client = client_for(&store);
    let outcome = tracker::sweep(&mut client, "bob").await.unwrap();
    assert_eq!(outcome.stale_removed, 2);
    assert_eq!(outcome.remaining, 1);
    assert!(!outcome.index_emptied);

    store.with_state(|state| {
        assert_eq!(
            state.set_members("user:sessions:bob"),
            vec!["session:10.0.0.1:S3"]
        );
        assert_eq!(
            state.set_members("nas:sessions:10.0.0.1"),
            vec!["session:10.0.0.1:S3"]
        );
        assert_eq!(state.int_value(SESSIONS), 1);
        assert_eq!(state.int_value(USERS), 1);
        assert_eq!(state.set_members(ONLINE), vec!["bob"]);
    });
}

#[tokio::test]
async fn test_janitor_retires_fully_expired_user() {
    let store = MiniStore::spawn().await;
    let mut tracker = tracker_for(&store);

    tracker.handle_event(&start("carol", "S9", "10.0.0.2", 60)).await;
    store.with_state(|state| state.expire_now("session:10.0.0.2:S9"));

    let mut client = client_for(&store);
    let outcome = tracker::sweep(&mut client, "carol").await.unwrap();
    assert_eq!(outcome.stale_removed, 1);
    assert!(outcome.index_emptied);

    store.with_state(|state| {
        assert!(state.set_members(ONLINE).is_empty());
        assert_eq!(state.int_value(SESSIONS), 0);
        assert_eq!(state.int_value(USERS), 0);
    });

    // Sweeping an unknown user is a no-op, not a negative count.
    tracker::sweep(&mut client, "carol").await.unwrap();
    store.with_state(|state| {
        assert_eq!(state.int_value(USERS), 0);
    });
}

#[tokio::test]
async fn test_nas_bulk_teardown() {
    let store = MiniStore::spawn().await;
    let mut tracker = tracker_for(&store);

    tracker.handle_event(&start("alice", "S1", "10.0.0.1", 60)).await;
    tracker.handle_event(&start("bob", "S2", "10.0.0.1", 60)).await;
    tracker.handle_event(&start("bob", "S3", "10.0.0.2", 60)).await;

    store.with_state(|state| {
        assert_eq!(state.int_value(SESSIONS), 3);
        assert_eq!(state.int_value(USERS), 2);
    });

    let outcome = tracker.handle_event(&nas_reset("10.0.0.1")).await;
    assert_eq!(outcome, EventOutcome::Recorded);

    store.with_state(|state| {
        assert!(!state.contains("session:10.0.0.1:S1"));
        assert!(!state.contains("session:10.0.0.1:S2"));
        assert!(state.contains("session:10.0.0.2:S3"));
        assert!(state.set_members("nas:sessions:10.0.0.1").is_empty());

        // alice lost her only session; bob survives on the other NAS.
        assert_eq!(state.set_members(ONLINE), vec!["bob"]);
        assert_eq!(state.int_value(SESSIONS), 1);
        assert_eq!(state.int_value(USERS), 1);
    });
}

#[tokio::test]
async fn test_nas_teardown_with_no_sessions() {
    let store = MiniStore::spawn().await;
    let mut tracker = tracker_for(&store);

    let outcome = tracker.handle_event(&nas_reset("10.9.9.9")).await;
    assert_eq!(outcome, EventOutcome::Recorded);
    store.with_state(|state| {
        assert_eq!(state.int_value(SESSIONS), 0);
        assert_eq!(state.int_value(USERS), 0);
    });
}

#[tokio::test]
async fn test_scenario_start_interim_stop() {
    let store = MiniStore::spawn().await;
    let mut tracker = tracker_for(&store);
    let skey = "session:10.0.0.1:S1";

    // Start with a 60s interim interval: TTL = max(120, 60*2 + 60) = 180.
    tracker.handle_event(&start("alice", "S1", "10.0.0.1", 60)).await;
    store.with_state(|state| {
        assert_eq!(state.ttl_secs(skey), Some(180));
        assert_eq!(state.hash_field(skey, "eventKind"), Some("start".to_string()));
    });

    tracker
        .handle_event(&interim("alice", "S1", "10.0.0.1", 60, 1_000_000, 500_000))
        .await;
    store.with_state(|state| {
        assert_eq!(state.ttl_secs(skey), Some(180));
        assert_eq!(state.hash_field(skey, "sessionTimeSeconds"), Some("60".to_string()));
        assert_eq!(state.hash_field(skey, "inputBytes"), Some("1000000".to_string()));
        assert_eq!(state.hash_field(skey, "outputBytes"), Some("500000".to_string()));
        assert_eq!(state.hash_field(skey, "eventKind"), Some("interim".to_string()));
    });

    tracker.handle_event(&stop("alice", "S1", "10.0.0.1", 120)).await;
    store.with_state(|state| {
        assert!(!state.contains(skey));
        assert!(state.set_members("user:sessions:alice").is_empty());
        assert!(state.set_members("nas:sessions:10.0.0.1").is_empty());
        assert_eq!(state.int_value(SESSIONS), 0);
        assert_eq!(state.int_value(USERS), 0);
        assert!(state.set_members(ONLINE).is_empty());
    });
}

#[tokio::test]
async fn test_index_ttls_are_refreshed() {
    let store = MiniStore::spawn().await;
    let mut tracker = tracker_for(&store);

    tracker.handle_event(&start("alice", "S1", "10.0.0.1", 60)).await;

    let config = test_config(&store);
    store.with_state(|state| {
        assert_eq!(
            state.ttl_secs("user:sessions:alice"),
            Some(config.index_ttl.as_secs())
        );
        assert_eq!(
            state.ttl_secs("nas:sessions:10.0.0.1"),
            Some(config.index_ttl.as_secs())
        );
        // The record must always expire before the indices pointing at it.
        assert!(state.ttl_secs("session:10.0.0.1:S1").unwrap() < config.index_ttl.as_secs());
    });
}

#[tokio::test]
async fn test_malformed_event_is_ignored() {
    let store = MiniStore::spawn().await;
    let mut tracker = tracker_for(&store);

    let missing_ids = json!({ "Acct-Status-Type": "Start" });
    assert_eq!(
        tracker.handle_event(&missing_ids).await,
        EventOutcome::Ignored
    );

    let not_an_object = json!([1, 2, 3]);
    assert_eq!(
        tracker.handle_event(&not_an_object).await,
        EventOutcome::Ignored
    );

    store.with_state(|state| {
        assert!(state.entries.is_empty());
    });
}

#[tokio::test]
async fn test_store_outage_degrades_without_failing() {
    // Nothing listens here; every store call fails.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = Arc::new(TrackerConfig {
        store_addr: addr.to_string(),
        store_timeout: Duration::from_millis(200),
        ..Default::default()
    });
    let client = StoreClient::new(
        config.store_addr.clone(),
        config.store_db,
        config.store_timeout,
        config.backoff_policy(),
    );
    let mut tracker = SessionTracker::new(client, config, Arc::new(TrackerStats::new()));

    let outcome = tracker.handle_event(&start("alice", "S1", "10.0.0.1", 60)).await;
    assert_eq!(outcome, EventOutcome::Degraded);

    // Still degraded, still not an error, and fast (cooldown fail-fast).
    let outcome = tracker.handle_event(&stop("alice", "S1", "10.0.0.1", 120)).await;
    assert_eq!(outcome, EventOutcome::Degraded);
}

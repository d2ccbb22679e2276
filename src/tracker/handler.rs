//! Session Lifecycle Handler
//!
//! The state machine at the center of the tracker. Each accounting event
//! drives one transition:
//!
//! ```text
//!            Start                    Stop / TTL expiry
//!  absent ──────────────> active ──────────────────────> absent
//!                          │  ▲
//!                          └──┘
//!                     Interim-Update
//! ```
//!
//! plus the NAS-wide teardown on Accounting-On / Accounting-Off. Every
//! transition compiles into one or two pipelined store batches: reads whose
//! results gate counter updates go first, then a single write batch.
//!
//! The handler never fails upward. Whatever happens inside (malformed event,
//! dead store, garbage reply), [`SessionTracker::handle_event`] returns an
//! [`EventOutcome`] and the AAA server's accounting path continues.

use crate::config::TrackerConfig;
use crate::event::{AccountingEvent, AcctStatusType};
use crate::store::{expect_integer, expect_strings, Command, StoreClient, StoreError};
use crate::tracker::janitor;
use crate::tracker::keys;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// How handling one event concluded. None of these are errors to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event was decoded and its store updates were issued.
    Recorded,
    /// The event was malformed or unrecognized; nothing was written.
    Ignored,
    /// The store was unreachable or answered garbage; updates were skipped.
    Degraded,
}

impl EventOutcome {
    /// Stable wire name, reported back on the intake connection.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Recorded => "recorded",
            EventOutcome::Ignored => "ignored",
            EventOutcome::Degraded => "store-unavailable",
        }
    }
}

/// Counters shared across all tracker instances of a process.
#[derive(Debug, Default)]
pub struct TrackerStats {
    /// Events decoded and applied to the store.
    pub events_recorded: AtomicU64,
    /// Events dropped by the decoder.
    pub events_ignored: AtomicU64,
    /// Events whose store updates failed.
    pub store_failures: AtomicU64,
    /// Janitor sweeps executed.
    pub janitor_sweeps: AtomicU64,
}

impl TrackerStats {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One tracker per accounting worker: owns its store client and its
/// per-user interim throttle. Nothing here is shared between workers.
pub struct SessionTracker {
    client: StoreClient,
    config: Arc<TrackerConfig>,
    stats: Arc<TrackerStats>,
    /// Interim-Updates seen per user since this worker started.
    interim_seen: HashMap<String, u64>,
}

impl SessionTracker {
    pub fn new(client: StoreClient, config: Arc<TrackerConfig>, stats: Arc<TrackerStats>) -> Self {
        Self {
            client,
            config,
            stats,
            interim_seen: HashMap::new(),
        }
    }

    /// Applies one accounting payload to the online-session index.
    ///
    /// This is the only public entry point and it cannot fail: malformed
    /// events and store outages degrade to an [`EventOutcome`] so the
    /// caller always proceeds with the accounting response.
    pub async fn handle_event(&mut self, payload: &serde_json::Value) -> EventOutcome {
        let event = match AccountingEvent::decode(payload) {
            Ok(event) => event,
            Err(reason) => {
                debug!(reason = %reason, "Ignoring accounting event");
                self.stats.events_ignored.fetch_add(1, Ordering::Relaxed);
                return EventOutcome::Ignored;
            }
        };

        let result = match event.status {
            AcctStatusType::Start => self.on_start(&event).await,
            AcctStatusType::InterimUpdate => self.on_interim(&event).await,
            AcctStatusType::Stop => self.on_stop(&event).await,
            AcctStatusType::AccountingOn | AcctStatusType::AccountingOff => {
                self.on_nas_reset(&event).await
            }
        };

        match result {
            Ok(()) => {
                self.stats.events_recorded.fetch_add(1, Ordering::Relaxed);
                EventOutcome::Recorded
            }
            Err(e) => {
                self.stats.store_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %e,
                    status = ?event.status,
                    session = %event.session_id,
                    user = %event.username,
                    "Store update failed, accounting continues"
                );
                EventOutcome::Degraded
            }
        }
    }

    async fn on_start(&mut self, event: &AccountingEvent) -> Result<(), StoreError> {
        let skey = keys::session(&event.nas_address, &event.session_id);
        let ukey = keys::user_index(&event.username);
        let nkey = keys::nas_index(&event.nas_address);

        // Existence gates the session counter (a retransmitted Start must
        // not count twice); prior cardinality gates the user counter.
        let reads = self
            .client
            .pipeline(&[Command::Exists(skey.clone()), Command::SCard(ukey.clone())])
            .await?;
        let existed = expect_integer(&reads[0], "EXISTS")? != 0;
        let prior_members = expect_integer(&reads[1], "SCARD")?;

        let ttl = session_ttl(&self.config, event.interim_interval);
        let mut batch = self.session_write_batch(event, &skey, &ukey, &nkey, ttl);
        if !existed {
            batch.push(Command::Incr(keys::SESSION_COUNT.to_string()));
        }
        if prior_members == 0 {
            batch.push(Command::Incr(keys::USER_COUNT.to_string()));
        }
        self.client.pipeline(&batch).await?;

        debug!(
            user = %event.username,
            session = %event.session_id,
            nas = %event.nas_address,
            ttl_secs = ttl,
            "Session started"
        );
        Ok(())
    }

    async fn on_interim(&mut self, event: &AccountingEvent) -> Result<(), StoreError> {
        let skey = keys::session(&event.nas_address, &event.session_id);
        let ukey = keys::user_index(&event.username);
        let nkey = keys::nas_index(&event.nas_address);

        let ttl = session_ttl(&self.config, event.interim_interval);
        let batch = self.session_write_batch(event, &skey, &ukey, &nkey, ttl);
        self.client.pipeline(&batch).await?;

        debug!(
            user = %event.username,
            session = %event.session_id,
            session_time = event.session_time,
            "Session refreshed"
        );

        let counter = self.interim_seen.entry(event.username.clone()).or_insert(0);
        *counter += 1;
        let seen = *counter;
        if seen % self.config.janitor_interval == 0 {
            self.stats.janitor_sweeps.fetch_add(1, Ordering::Relaxed);
            janitor::sweep(&mut self.client, &event.username).await?;
        }
        Ok(())
    }

    async fn on_stop(&mut self, event: &AccountingEvent) -> Result<(), StoreError> {
        let skey = keys::session(&event.nas_address, &event.session_id);
        let ukey = keys::user_index(&event.username);
        let nkey = keys::nas_index(&event.nas_address);

        // A second Stop for the same session finds nothing to delete and
        // must not decrement the counter again.
        let existed = expect_integer(
            &self.client.execute(&Command::Exists(skey.clone())).await?,
            "EXISTS",
        )? != 0;

        let mut batch = vec![
            Command::Del(skey.clone()),
            Command::SRem {
                key: ukey,
                member: skey.clone(),
            },
            Command::SRem {
                key: nkey,
                member: skey,
            },
        ];
        if existed {
            batch.push(Command::Decr(keys::SESSION_COUNT.to_string()));
        }
        self.client.pipeline(&batch).await?;

        self.stats.janitor_sweeps.fetch_add(1, Ordering::Relaxed);
        let sweep = janitor::sweep(&mut self.client, &event.username).await?;
        if sweep.index_emptied {
            self.interim_seen.remove(&event.username);
        }

        debug!(
            user = %event.username,
            session = %event.session_id,
            cause = %event.terminate_cause,
            session_time = event.session_time,
            "Session stopped"
        );
        Ok(())
    }

    /// Accounting-On/Off: the NAS rebooted, every session it carried is gone.
    async fn on_nas_reset(&mut self, event: &AccountingEvent) -> Result<(), StoreError> {
        let nkey = keys::nas_index(&event.nas_address);

        let members = expect_strings(
            self.client.execute(&Command::SMembers(nkey.clone())).await?,
            "SMEMBERS",
        )?;
        if members.is_empty() {
            self.client.execute(&Command::Del(nkey)).await?;
            debug!(nas = %event.nas_address, "NAS reset with no tracked sessions");
            return Ok(());
        }

        // One probe per member tells us both whether it was still live and
        // which User Index owns it.
        let probes: Vec<Command> = members
            .iter()
            .map(|member| Command::HGet {
                key: member.clone(),
                field: "username".to_string(),
            })
            .collect();
        let replies = self.client.pipeline(&probes).await?;

        let mut live = 0i64;
        let mut affected: BTreeSet<String> = BTreeSet::new();
        let mut batch: Vec<Command> = Vec::with_capacity(members.len() * 2 + 2);
        for (member, reply) in members.iter().zip(replies.iter()) {
            if let Some(owner) = reply.as_str() {
                live += 1;
                batch.push(Command::SRem {
                    key: keys::user_index(owner),
                    member: member.clone(),
                });
                affected.insert(owner.to_string());
            }
            batch.push(Command::Del(member.clone()));
        }
        batch.push(Command::Del(nkey));
        if live > 0 {
            batch.push(Command::DecrBy(keys::SESSION_COUNT.to_string(), live));
        }
        self.client.pipeline(&batch).await?;

        // Every affected user gets a sweep; it prunes whatever else went
        // stale and retires users left with no sessions at all.
        for username in &affected {
            self.stats.janitor_sweeps.fetch_add(1, Ordering::Relaxed);
            let sweep = janitor::sweep(&mut self.client, username).await?;
            if sweep.index_emptied {
                self.interim_seen.remove(username);
            }
        }

        info!(
            nas = %event.nas_address,
            sessions = live,
            users = affected.len(),
            "NAS reset, tracked sessions torn down"
        );
        Ok(())
    }

    /// The write batch shared by Start and Interim-Update: overwrite the
    /// Session Record, refresh every TTL, re-add to both indices and the
    /// online set. All of it is idempotent.
    fn session_write_batch(
        &self,
        event: &AccountingEvent,
        skey: &str,
        ukey: &str,
        nkey: &str,
        ttl: u64,
    ) -> Vec<Command> {
        let index_ttl = self.config.index_ttl.as_secs();
        vec![
            Command::HSet {
                key: skey.to_string(),
                fields: record_fields(event),
            },
            Command::Expire {
                key: skey.to_string(),
                seconds: ttl,
            },
            Command::SAdd {
                key: ukey.to_string(),
                member: skey.to_string(),
            },
            Command::Expire {
                key: ukey.to_string(),
                seconds: index_ttl,
            },
            Command::SAdd {
                key: nkey.to_string(),
                member: skey.to_string(),
            },
            Command::Expire {
                key: nkey.to_string(),
                seconds: index_ttl,
            },
            Command::SAdd {
                key: keys::ONLINE_USERS.to_string(),
                member: event.username.clone(),
            },
        ]
    }
}

impl std::fmt::Debug for SessionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTracker")
            .field("client", &self.client)
            .field("tracked_users", &self.interim_seen.len())
            .finish()
    }
}

/// Session Record TTL: long enough to survive one missed interim cycle,
/// never longer than the configured ceiling.
fn session_ttl(config: &TrackerConfig, interim_interval: u64) -> u64 {
    let derived = interim_interval
        .saturating_mul(2)
        .saturating_add(config.ttl_margin.as_secs());
    config
        .default_ttl
        .as_secs()
        .max(derived)
        .min(config.max_ttl.as_secs())
}

/// The full field set of a Session Record, as written on Start and
/// overwritten wholesale on every Interim-Update.
fn record_fields(event: &AccountingEvent) -> Vec<(String, String)> {
    let now = epoch_now();
    let started_at = now.saturating_sub(event.session_time);
    vec![
        ("username".to_string(), event.username.clone()),
        ("sessionId".to_string(), event.session_id.clone()),
        ("nasAddress".to_string(), event.nas_address.clone()),
        ("framedIp".to_string(), event.framed_ip.clone()),
        ("calledStationId".to_string(), event.called_station_id.clone()),
        (
            "callingStationId".to_string(),
            event.calling_station_id.clone(),
        ),
        ("nasPort".to_string(), event.nas_port.clone()),
        (
            "sessionTimeSeconds".to_string(),
            event.session_time.to_string(),
        ),
        (
            "inputBytes".to_string(),
            event.total_input_bytes().to_string(),
        ),
        (
            "outputBytes".to_string(),
            event.total_output_bytes().to_string(),
        ),
        ("startedAtEpoch".to_string(), started_at.to_string()),
        ("lastUpdatedAtEpoch".to_string(), now.to_string()),
        ("eventKind".to_string(), event.status.kind().to_string()),
    ]
}

fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

//! Lazy Index Janitor
//!
//! Session Records expire on their own TTL when a Stop never arrives, but
//! the index sets pointing at them do not notice. This module is the only
//! reconciliation mechanism: given a username, it probes every member of the
//! User Index and removes the ones whose Session Record no longer exists,
//! fixing the session counter as it goes.
//!
//! The sweep costs O(index cardinality) in store probes, so callers throttle
//! it (every Nth Interim-Update per user); it also runs on every Stop, where
//! the index is about to be read anyway.

use crate::store::{expect_integer, expect_strings, Command, StoreClient, StoreError};
use crate::tracker::keys;
use tracing::debug;

/// What one sweep of a user's index accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepOutcome {
    /// Stale members removed from the User Index (and their NAS Indices).
    pub stale_removed: usize,
    /// Live members left behind.
    pub remaining: usize,
    /// Whether the index ended up empty and was torn down.
    pub index_emptied: bool,
}

/// Sweeps one user's index: drops members whose Session Record is gone.
///
/// For every stale member the session counter is decremented (one `DECRBY`
/// for the whole batch). When the index ends up empty the username is
/// removed from the online set, the index key is deleted, and the user
/// counter is decremented; the decrement is guarded by the `SREM` reply so a
/// user who was already offline is not counted down twice.
pub async fn sweep(
    client: &mut StoreClient,
    username: &str,
) -> Result<SweepOutcome, StoreError> {
    let ukey = keys::user_index(username);

    let members = expect_strings(
        client.execute(&Command::SMembers(ukey.clone())).await?,
        "SMEMBERS",
    )?;

    let mut outcome = SweepOutcome::default();

    if !members.is_empty() {
        let probes: Vec<Command> = members
            .iter()
            .map(|member| Command::Exists(member.clone()))
            .collect();
        let replies = client.pipeline(&probes).await?;

        let mut stale: Vec<&String> = Vec::new();
        for (member, reply) in members.iter().zip(replies.iter()) {
            if expect_integer(reply, "EXISTS")? == 0 {
                stale.push(member);
            }
        }

        outcome.stale_removed = stale.len();
        outcome.remaining = members.len() - stale.len();

        if !stale.is_empty() {
            let mut batch: Vec<Command> = Vec::with_capacity(stale.len() * 2 + 1);
            for member in &stale {
                batch.push(Command::SRem {
                    key: ukey.clone(),
                    member: (*member).clone(),
                });
                if let Some((nas_address, _)) = keys::parse_session(member) {
                    batch.push(Command::SRem {
                        key: keys::nas_index(nas_address),
                        member: (*member).clone(),
                    });
                }
            }
            batch.push(Command::DecrBy(
                keys::SESSION_COUNT.to_string(),
                stale.len() as i64,
            ));
            client.pipeline(&batch).await?;

            debug!(
                user = %username,
                stale = stale.len(),
                remaining = outcome.remaining,
                "Pruned stale index members"
            );
        }
    }

    if outcome.remaining == 0 {
        outcome.index_emptied = true;
        let removed = expect_integer(
            &client
                .execute(&Command::SRem {
                    key: keys::ONLINE_USERS.to_string(),
                    member: username.to_string(),
                })
                .await?,
            "SREM",
        )?;
        let mut teardown = vec![Command::Del(ukey)];
        if removed == 1 {
            teardown.push(Command::Decr(keys::USER_COUNT.to_string()));
        }
        client.pipeline(&teardown).await?;

        if removed == 1 {
            debug!(user = %username, "User has no live sessions, removed from online set");
        }
    }

    Ok(outcome)
}

//! Cache key construction and parsing.
//!
//! All tracker state lives under a handful of key shapes:
//!
//! - `session:{nasAddress}:{sessionId}` - one hash per live session
//! - `user:sessions:{username}` - set of session keys per subscriber
//! - `nas:sessions:{nasAddress}` - set of session keys per NAS device
//! - `online:users` - set of usernames with at least one indexed session
//! - `online:count:sessions` / `online:count:users` - atomic counters

/// Set of usernames currently believed online.
pub const ONLINE_USERS: &str = "online:users";

/// Approximate count of live Session Records.
pub const SESSION_COUNT: &str = "online:count:sessions";

/// Approximate count of users with at least one live session.
pub const USER_COUNT: &str = "online:count:users";

const SESSION_PREFIX: &str = "session:";

/// Key of the Session Record for `(nas_address, session_id)`.
pub fn session(nas_address: &str, session_id: &str) -> String {
    format!("{}{}:{}", SESSION_PREFIX, nas_address, session_id)
}

/// Key of the User Index for `username`.
pub fn user_index(username: &str) -> String {
    format!("user:sessions:{}", username)
}

/// Key of the NAS Index for `nas_address`.
pub fn nas_index(nas_address: &str) -> String {
    format!("nas:sessions:{}", nas_address)
}

/// Recovers `(nas_address, session_id)` from a Session Record key.
///
/// NAS addresses are IPv4 dotted quads and never contain `:`, so the split
/// happens at the first colon after the prefix; session ids may themselves
/// contain colons.
pub fn parse_session(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix(SESSION_PREFIX)?;
    let (nas_address, session_id) = rest.split_once(':')?;
    if nas_address.is_empty() || session_id.is_empty() {
        return None;
    }
    Some((nas_address, session_id))
}

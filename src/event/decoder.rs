//! Accounting Event Decoder
//!
//! Accounting events arrive as JSON objects keyed by RADIUS attribute names
//! (`Acct-Status-Type`, `Acct-Session-Id`, ...). The attribute set is open
//! ended and loosely typed: numeric attributes show up as JSON numbers or as
//! numeric strings, values are sometimes wrapped in single-element arrays,
//! and any attribute may simply be missing.
//!
//! The decoder collapses all of that into one fixed, strongly typed record.
//! Missing numerics default to 0 and missing strings to empty, with one
//! exception: events missing their mandatory identifiers (session id and
//! username for session events, NAS address for NAS-wide events) are
//! rejected so that partial state never reaches the store.

use serde_json::Value;
use thiserror::Error;

/// Accounting status types recognized by the tracker.
///
/// Accepts either the RFC attribute-value names (`Start`, `Interim-Update`,
/// `Stop`, `Accounting-On`, `Accounting-Off`) or their numeric codes
/// (1, 3, 2, 7, 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcctStatusType {
    Start,
    InterimUpdate,
    Stop,
    AccountingOn,
    AccountingOff,
}

impl AcctStatusType {
    fn from_attr(value: &Value) -> Option<Self> {
        if let Some(s) = scalar_str(value) {
            return match s {
                "Start" => Some(Self::Start),
                "Interim-Update" | "Alive" => Some(Self::InterimUpdate),
                "Stop" => Some(Self::Stop),
                "Accounting-On" => Some(Self::AccountingOn),
                "Accounting-Off" => Some(Self::AccountingOff),
                _ => s.parse::<u64>().ok().and_then(Self::from_code),
            };
        }
        scalar_u64(value).and_then(Self::from_code)
    }

    fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(Self::Start),
            2 => Some(Self::Stop),
            3 => Some(Self::InterimUpdate),
            7 => Some(Self::AccountingOn),
            8 => Some(Self::AccountingOff),
            _ => None,
        }
    }

    /// The value stored in the Session Record's `eventKind` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::InterimUpdate => "interim",
            Self::Stop => "stop",
            Self::AccountingOn | Self::AccountingOff => "nas-reset",
        }
    }

    /// True for Accounting-On / Accounting-Off.
    pub fn is_nas_wide(&self) -> bool {
        matches!(self, Self::AccountingOn | Self::AccountingOff)
    }
}

/// Why an inbound payload was classified as a no-op.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("missing or unrecognized Acct-Status-Type")]
    UnknownStatusType,

    #[error("missing Acct-Session-Id")]
    MissingSessionId,

    #[error("missing User-Name")]
    MissingUsername,

    #[error("missing NAS-IP-Address")]
    MissingNasAddress,
}

/// One decoded accounting event, with every attribute defaulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountingEvent {
    pub status: AcctStatusType,
    pub session_id: String,
    pub username: String,
    pub nas_address: String,
    pub framed_ip: String,
    pub nas_port: String,
    pub called_station_id: String,
    pub calling_station_id: String,
    pub terminate_cause: String,
    /// Cumulative session duration as reported by the AAA server.
    pub session_time: u64,
    pub input_octets: u64,
    pub output_octets: u64,
    /// Times the 32-bit input octet counter wrapped.
    pub input_gigawords: u64,
    /// Times the 32-bit output octet counter wrapped.
    pub output_gigawords: u64,
    /// Seconds between Interim-Updates, 0 when the NAS did not report one.
    pub interim_interval: u64,
}

impl AccountingEvent {
    /// Decodes one accounting payload into a typed event.
    pub fn decode(payload: &Value) -> Result<Self, DecodeError> {
        let obj = payload.as_object().ok_or(DecodeError::NotAnObject)?;

        let status = obj
            .get("Acct-Status-Type")
            .and_then(AcctStatusType::from_attr)
            .ok_or(DecodeError::UnknownStatusType)?;

        let event = Self {
            status,
            session_id: str_attr(obj, "Acct-Session-Id"),
            username: str_attr(obj, "User-Name"),
            nas_address: str_attr(obj, "NAS-IP-Address"),
            framed_ip: str_attr(obj, "Framed-IP-Address"),
            nas_port: {
                let port_id = str_attr(obj, "NAS-Port-Id");
                if port_id.is_empty() {
                    // NAS-Port is an integer attribute on most devices.
                    obj.get("NAS-Port")
                        .and_then(scalar_u64)
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| str_attr(obj, "NAS-Port"))
                } else {
                    port_id
                }
            },
            called_station_id: str_attr(obj, "Called-Station-Id"),
            calling_station_id: str_attr(obj, "Calling-Station-Id"),
            terminate_cause: str_attr(obj, "Acct-Terminate-Cause"),
            session_time: num_attr(obj, "Acct-Session-Time"),
            input_octets: num_attr(obj, "Acct-Input-Octets"),
            output_octets: num_attr(obj, "Acct-Output-Octets"),
            input_gigawords: num_attr(obj, "Acct-Input-Gigawords"),
            output_gigawords: num_attr(obj, "Acct-Output-Gigawords"),
            interim_interval: num_attr(obj, "Acct-Interim-Interval"),
        };

        if event.status.is_nas_wide() {
            if event.nas_address.is_empty() {
                return Err(DecodeError::MissingNasAddress);
            }
        } else {
            if event.session_id.is_empty() {
                return Err(DecodeError::MissingSessionId);
            }
            if event.username.is_empty() {
                return Err(DecodeError::MissingUsername);
            }
        }

        Ok(event)
    }

    /// Gigaword-adjusted cumulative input bytes.
    pub fn total_input_bytes(&self) -> u64 {
        self.input_gigawords
            .saturating_mul(1 << 32)
            .saturating_add(self.input_octets)
    }

    /// Gigaword-adjusted cumulative output bytes.
    pub fn total_output_bytes(&self) -> u64 {
        self.output_gigawords
            .saturating_mul(1 << 32)
            .saturating_add(self.output_octets)
    }
}

/// Unwraps the FreeRADIUS habit of shipping values as one-element arrays.
fn scalar(value: &Value) -> &Value {
    match value {
        Value::Array(items) if items.len() == 1 => &items[0],
        other => other,
    }
}

fn scalar_str(value: &Value) -> Option<&str> {
    scalar(value).as_str()
}

fn scalar_u64(value: &Value) -> Option<u64> {
    let value = scalar(value);
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// String attribute, empty when missing or not a string.
fn str_attr(obj: &serde_json::Map<String, Value>, name: &str) -> String {
    obj.get(name)
        .and_then(scalar_str)
        .unwrap_or_default()
        .to_string()
}

/// Numeric attribute, 0 when missing or unparseable.
fn num_attr(obj: &serde_json::Map<String, Value>, name: &str) -> u64 {
    obj.get(name).and_then(scalar_u64).unwrap_or(0)
}

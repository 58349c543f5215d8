// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Peer signal payloads exchanged over the messaging channel.
//!
//! Signals are ephemeral JSON objects (`{"t":"INVITE","v":1,"callId":...}`).
//! They are never persisted and carry no delivery guarantee.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::CallId;

/// Schema version stamped on signals when the sender does not choose one.
pub const DEFAULT_SCHEMA_VERSION: u32 = 1;

/// Kind of peer signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum SignalType {
    Invite,
    Answer,
    Decline,
    End,
}

/// A single peer signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtmSignal {
    #[serde(rename = "t")]
    pub signal_type: SignalType,
    #[serde(rename = "v", default = "default_version")]
    pub version: u32,
    pub call_id: CallId,
    pub from: String,
    /// Sender clock, milliseconds since the Unix epoch.
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

fn default_version() -> u32 {
    DEFAULT_SCHEMA_VERSION
}

impl RtmSignal {
    fn base(signal_type: SignalType, call_id: &CallId, from: &str, version: u32) -> Self {
        Self {
            signal_type,
            version,
            call_id: call_id.clone(),
            from: from.to_string(),
            ts: chrono::Utc::now().timestamp_millis(),
            channel: None,
            reason: None,
            cause: None,
            client_version: None,
            context: None,
        }
    }

    /// INVITE announcing a new call on `channel`.
    pub fn invite(call_id: &CallId, from: &str, channel: &str, version: u32) -> Self {
        Self {
            channel: Some(channel.to_string()),
            ..Self::base(SignalType::Invite, call_id, from, version)
        }
    }

    /// ANSWER sent by the resident who won the call.
    pub fn answer(call_id: &CallId, from: &str, version: u32) -> Self {
        Self::base(SignalType::Answer, call_id, from, version)
    }

    /// DECLINE sent by a resident refusing the call.
    pub fn decline(call_id: &CallId, from: &str, reason: &str, version: u32) -> Self {
        Self {
            reason: Some(reason.to_string()),
            ..Self::base(SignalType::Decline, call_id, from, version)
        }
    }

    /// END sent by whoever hangs up.
    pub fn end(call_id: &CallId, from: &str, cause: &str, version: u32) -> Self {
        Self {
            cause: Some(cause.to_string()),
            ..Self::base(SignalType::End, call_id, from, version)
        }
    }

    /// Serializes to the JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses the JSON wire form. Unknown `t` values are rejected.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_uses_short_wire_keys() {
        let signal = RtmSignal::invite(&CallId::from("c1"), "doorman-1", "call-c1", 1);
        let json: serde_json::Value = serde_json::from_str(&signal.to_json().unwrap()).unwrap();
        assert_eq!(json["t"], "INVITE");
        assert_eq!(json["v"], 1);
        assert_eq!(json["callId"], "c1");
        assert_eq!(json["channel"], "call-c1");
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn version_defaults_when_absent() {
        let signal =
            RtmSignal::from_json(r#"{"t":"END","callId":"c9","from":"r1","ts":5,"cause":"hangup"}"#)
                .unwrap();
        assert_eq!(signal.signal_type, SignalType::End);
        assert_eq!(signal.version, DEFAULT_SCHEMA_VERSION);
        assert_eq!(signal.cause.as_deref(), Some("hangup"));
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(RtmSignal::from_json(r#"{"t":"PING","callId":"c","from":"x","ts":1}"#).is_err());
        assert!(RtmSignal::from_json(r#"{"callId":"c","from":"x","ts":1}"#).is_err());
        assert!(RtmSignal::from_json("not json").is_err());
    }
}

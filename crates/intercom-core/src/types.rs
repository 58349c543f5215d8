// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the call service, the stores and the clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Prefix of every per-call media/messaging channel.
pub const CALL_CHANNEL_PREFIX: &str = "call-";

/// Unique identifier for a call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub String);

impl CallId {
    /// Generates a fresh random call identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The media/messaging channel name derived from this call.
    pub fn channel_name(&self) -> String {
        format!("{CALL_CHANNEL_PREFIX}{}", self.0)
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Server-side status of a call.
///
/// `ringing -> active -> ended`, `ringing -> declined`, `ringing -> ended`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CallStatus {
    Ringing,
    Active,
    Declined,
    Ended,
}

impl CallStatus {
    /// Whether an `answer` or `decline` may still be applied.
    pub fn is_ringing(self) -> bool {
        self == CallStatus::Ringing
    }

    /// Final statuses: the row never changes again.
    pub fn is_final(self) -> bool {
        matches!(self, CallStatus::Declined | CallStatus::Ended)
    }
}

/// Status of one participant within a call.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParticipantStatus {
    Invited,
    Ringing,
    Notified,
    #[serde(alias = "answered")]
    #[strum(to_string = "connected", serialize = "answered")]
    Connected,
    Missed,
    Declined,
    Disconnected,
}

impl ParticipantStatus {
    /// Still waiting for this participant to pick up or refuse.
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            ParticipantStatus::Invited | ParticipantStatus::Ringing | ParticipantStatus::Notified
        )
    }
}

/// Kind of user taking part in a call.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserType {
    Doorman,
    Resident,
}

/// Media role granted by a token.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TokenRole {
    Publisher,
    Subscriber,
}

impl TokenRole {
    /// Maps a requested role name to a role; anything except `subscriber`
    /// becomes `publisher`.
    pub fn from_requested(requested: Option<&str>) -> Self {
        match requested {
            Some(r) if r.eq_ignore_ascii_case("subscriber") => TokenRole::Subscriber,
            _ => TokenRole::Publisher,
        }
    }
}

/// One ring-to-hangup session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub id: CallId,
    pub channel_name: String,
    pub apartment_id: String,
    pub apartment_number: String,
    pub building_id: String,
    pub doorman_id: String,
    pub status: CallStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub answered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Only set once an answered call has ended.
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub end_cause: Option<String>,
}

impl Call {
    /// Duration reported to clients: zero for calls that were never answered.
    pub fn reported_duration(&self) -> i64 {
        self.duration_seconds.unwrap_or(0)
    }
}

/// One person's membership in a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub call_id: CallId,
    pub user_id: String,
    pub user_type: UserType,
    pub status: ParticipantStatus,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub left_at: Option<DateTime<Utc>>,
}

/// A call together with its participant rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSnapshot {
    pub call: Call,
    pub participants: Vec<Participant>,
}

impl CallSnapshot {
    /// Finds the participant row for `user_id`.
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    /// Resident participants only.
    pub fn residents(&self) -> impl Iterator<Item = &Participant> {
        self.participants
            .iter()
            .filter(|p| p.user_type == UserType::Resident)
    }
}

/// An apartment in a building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Apartment {
    pub id: String,
    pub building_id: String,
    pub number: String,
    #[serde(default)]
    pub block: Option<String>,
}

/// A doorman or resident profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub full_name: String,
    pub user_type: UserType,
    #[serde(default)]
    pub building_id: Option<String>,
}

/// Short-lived credential pair scoped to one (channel, uid, role) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBundle {
    pub rtc_token: String,
    pub rtm_token: String,
    pub uid: String,
    pub channel_name: String,
    #[serde(alias = "rtcRole")]
    pub role: TokenRole,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl TokenBundle {
    /// Whether this bundle may be used for `channel_name` as `uid`.
    pub fn is_scoped_to(&self, channel_name: &str, uid: &str) -> bool {
        self.channel_name == channel_name && self.uid == uid
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`crate::PluginAdapter`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Media,
    Messaging,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn call_status_round_trips_through_text() {
        for status in [
            CallStatus::Ringing,
            CallStatus::Active,
            CallStatus::Declined,
            CallStatus::Ended,
        ] {
            let text = status.to_string();
            assert_eq!(CallStatus::from_str(&text).unwrap(), status);
        }
        assert_eq!(CallStatus::Active.to_string(), "active");
    }

    #[test]
    fn only_declined_and_ended_are_final() {
        assert!(!CallStatus::Ringing.is_final());
        assert!(!CallStatus::Active.is_final());
        assert!(CallStatus::Declined.is_final());
        assert!(CallStatus::Ended.is_final());
    }

    #[test]
    fn answered_is_an_alias_for_connected() {
        assert_eq!(
            ParticipantStatus::from_str("answered").unwrap(),
            ParticipantStatus::Connected
        );
        assert_eq!(ParticipantStatus::Connected.to_string(), "connected");
        let parsed: ParticipantStatus = serde_json::from_str("\"answered\"").unwrap();
        assert_eq!(parsed, ParticipantStatus::Connected);
    }

    #[test]
    fn pending_participant_statuses() {
        assert!(ParticipantStatus::Invited.is_pending());
        assert!(ParticipantStatus::Notified.is_pending());
        assert!(!ParticipantStatus::Missed.is_pending());
        assert!(!ParticipantStatus::Connected.is_pending());
    }

    #[test]
    fn requested_role_defaults_to_publisher() {
        assert_eq!(TokenRole::from_requested(None), TokenRole::Publisher);
        assert_eq!(TokenRole::from_requested(Some("admin")), TokenRole::Publisher);
        assert_eq!(
            TokenRole::from_requested(Some("Subscriber")),
            TokenRole::Subscriber
        );
    }

    #[test]
    fn channel_name_is_derived_from_call_id() {
        let id = CallId::from("abc");
        assert_eq!(id.channel_name(), "call-abc");
    }

    #[test]
    fn call_serializes_camel_case() {
        let call = Call {
            id: CallId::from("c1"),
            channel_name: "call-c1".into(),
            apartment_id: "apt-1".into(),
            apartment_number: "302".into(),
            building_id: "b1".into(),
            doorman_id: "d1".into(),
            status: CallStatus::Ringing,
            started_at: Utc::now(),
            answered_at: None,
            ended_at: None,
            duration_seconds: None,
            end_cause: None,
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["channelName"], "call-c1");
        assert_eq!(json["status"], "ringing");
        assert!(json["durationSeconds"].is_null());
        assert_eq!(call.reported_duration(), 0);
    }
}

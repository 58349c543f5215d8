// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and response bodies of the call lifecycle REST surface.
//!
//! The same types are used by the service, the HTTP gateway and the client
//! side [`crate::CallApi`] implementations. Request fields default to empty so
//! that missing values surface as validation errors rather than decode errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signal::RtmSignal;
use crate::types::{Apartment, Call, CallId, CallStatus, Participant, Profile, TokenBundle};

/// Header carrying the authenticated caller's user id.
pub const USER_HEADER: &str = "x-intercom-user";

/// Body of `POST /calls/start`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCallRequest {
    #[serde(default)]
    pub apartment_number: String,
    #[serde(default)]
    pub building_id: String,
    #[serde(default, alias = "fromUserId")]
    pub doorman_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    /// Number or numeric string; anything else falls back to the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<serde_json::Value>,
}

impl StartCallRequest {
    /// Resolves the requested schema version, falling back to `default`.
    pub fn resolved_schema_version(&self, default: u32) -> u32 {
        match &self.schema_version {
            Some(serde_json::Value::Number(n)) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(default),
            Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }
}

/// Tokens handed to the caller when a call starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatorTokens {
    pub initiator: TokenBundle,
}

/// What the caller needs to ring the callees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signaling {
    pub invite: RtmSignal,
    pub targets: Vec<String>,
}

/// Response of `POST /calls/start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedCall {
    pub call: Call,
    pub participants: Vec<Participant>,
    pub apartment: Apartment,
    pub doorman: Profile,
    pub tokens: InitiatorTokens,
    pub signaling: Signaling,
}

/// Body of `POST /calls/{id}/answer`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_type: String,
}

/// Response of `POST /calls/{id}/answer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnsweredCall {
    pub call: Call,
    pub participants: Vec<Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenBundle>,
}

/// Body of `POST /calls/{id}/decline`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclineRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Response of `POST /calls/{id}/decline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclinedCall {
    pub call: Call,
    pub declined_by: String,
    /// True when this decline exhausted every resident.
    pub all_declined: bool,
}

/// Body of `POST /calls/{id}/end`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// Response of `POST /calls/{id}/end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndedCall {
    pub call: Call,
    pub ended_by: String,
    /// Seconds between answer and end, zero if never answered.
    pub duration: i64,
    /// False when the call had already reached a final status.
    pub changed: bool,
}

/// Query string of `GET /calls/history`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default)]
    pub building_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CallStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

/// Page bounds echoed back with history results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
    /// Total rows matching the filters, ignoring the page bounds.
    pub total: u64,
}

/// Response of `GET /calls/history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub calls: Vec<Call>,
    pub pagination: Pagination,
}

/// Body of `POST /tokens/generate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
}

/// Body of `POST /tokens/for-call`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTokenRequest {
    #[serde(default)]
    pub call_id: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl CallTokenRequest {
    pub fn new(call_id: &CallId, uid: &str) -> Self {
        Self {
            call_id: call_id.to_string(),
            uid: uid.to_string(),
            role: None,
        }
    }
}

/// Body of `POST /tokens/validate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenValidationRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub uid: String,
}

/// Response of `POST /tokens/validate`. A refused token is a normal answer,
/// not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenValidation {
    pub is_valid: bool,
    pub channel_name: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub validated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_user_id_is_accepted_for_doorman() {
        let req: StartCallRequest = serde_json::from_str(
            r#"{"apartmentNumber":"302","buildingId":"b1","fromUserId":"d1"}"#,
        )
        .unwrap();
        assert_eq!(req.doorman_id.as_deref(), Some("d1"));
    }

    #[test]
    fn missing_fields_decode_as_empty() {
        let req: StartCallRequest = serde_json::from_str("{}").unwrap();
        assert!(req.apartment_number.is_empty());
        assert!(req.doorman_id.is_none());
        let answer: AnswerRequest = serde_json::from_str("{}").unwrap();
        assert!(answer.user_id.is_empty());
    }

    #[test]
    fn schema_version_accepts_numbers_and_numeric_strings() {
        let mut req = StartCallRequest::default();
        assert_eq!(req.resolved_schema_version(1), 1);
        req.schema_version = Some(serde_json::json!(3));
        assert_eq!(req.resolved_schema_version(1), 3);
        req.schema_version = Some(serde_json::json!("4"));
        assert_eq!(req.resolved_schema_version(1), 4);
        req.schema_version = Some(serde_json::json!("latest"));
        assert_eq!(req.resolved_schema_version(1), 1);
        req.schema_version = Some(serde_json::json!(-2));
        assert_eq!(req.resolved_schema_version(1), 1);
    }

    #[test]
    fn history_query_parses_status() {
        let q: HistoryQuery =
            serde_json::from_str(r#"{"buildingId":"b1","status":"declined","limit":5}"#).unwrap();
        assert_eq!(q.status, Some(CallStatus::Declined));
        assert_eq!(q.limit, Some(5));
        assert_eq!(q.offset, None);
    }
}

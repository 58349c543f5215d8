// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The call lifecycle service.
//!
//! Every mutation goes through one conditional write on the [`CallStore`];
//! the service itself holds no per-call state and can run on any number of
//! replicas against the same store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use intercom_config::model::CallsConfig;
use intercom_core::api::{
    AnswerRequest, AnsweredCall, CallTokenRequest, DeclineRequest, DeclinedCall, EndRequest,
    EndedCall, HistoryPage, HistoryQuery, InitiatorTokens, Signaling, StartCallRequest,
    StartedCall, TokenRequest, TokenValidation, TokenValidationRequest,
};
use intercom_core::traits::{AnswerWrite, DeclineWrite, EndWrite};
use intercom_core::{
    CALL_CHANNEL_PREFIX, Call, CallId, CallSnapshot, CallStatus, CallStore, Clock, IntercomError,
    Participant, ParticipantStatus, RtmSignal, TokenBundle, TokenRole, UserType,
};
use intercom_tokens::TokenIssuer;
use tracing::{debug, info, warn};

/// End cause recorded when the request does not name one.
pub const DEFAULT_END_CAUSE: &str = "hangup";

/// End cause recorded by the stale-ringing sweep.
pub const TIMEOUT_END_CAUSE: &str = "timeout";

/// Authoritative owner of call and participant state.
pub struct CallService {
    store: Arc<dyn CallStore>,
    issuer: Arc<TokenIssuer>,
    clock: Arc<dyn Clock>,
    config: CallsConfig,
}

fn require(value: &str, field: &str) -> Result<(), IntercomError> {
    if value.trim().is_empty() {
        return Err(IntercomError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn parse_user_type(raw: &str) -> Result<UserType, IntercomError> {
    let raw = raw.trim();
    require(raw, "userType")?;
    raw.parse::<UserType>()
        .map_err(|_| IntercomError::Validation(format!("unknown userType '{raw}'")))
}

fn not_ringing(id: &CallId, status: CallStatus) -> IntercomError {
    IntercomError::invalid_state(format!("call {id} is {status}, not ringing"))
}

impl CallService {
    pub fn new(
        store: Arc<dyn CallStore>,
        issuer: Arc<TokenIssuer>,
        clock: Arc<dyn Clock>,
        config: CallsConfig,
    ) -> Self {
        Self {
            store,
            issuer,
            clock,
            config,
        }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn CallStore> {
        &self.store
    }

    /// Creates a ringing call for an apartment.
    ///
    /// The doorman joins pre-answered (`connected`), every active resident is
    /// `invited`. The response carries the doorman's token bundle and the
    /// INVITE the doorman should send to `signaling.targets`.
    pub async fn start(&self, request: &StartCallRequest) -> Result<StartedCall, IntercomError> {
        require(&request.apartment_number, "apartmentNumber")?;
        require(&request.building_id, "buildingId")?;
        let doorman_id = request.doorman_id.as_deref().unwrap_or_default();
        require(doorman_id, "doormanId")?;

        let apartment = self
            .store
            .find_apartment(&request.building_id, &request.apartment_number)
            .await?
            .ok_or_else(|| IntercomError::not_found("apartment", request.apartment_number.trim()))?;
        let doorman = self
            .store
            .find_profile(doorman_id)
            .await?
            .filter(|p| p.user_type == UserType::Doorman)
            .ok_or_else(|| IntercomError::not_found("doorman", doorman_id))?;

        let mut seen = HashSet::new();
        let residents: Vec<_> = self
            .store
            .active_residents(&apartment.id)
            .await?
            .into_iter()
            .filter(|r| r.id != doorman.id && seen.insert(r.id.clone()))
            .collect();
        if residents.is_empty() {
            return Err(IntercomError::NoResidents {
                apartment_id: apartment.id.clone(),
            });
        }

        let id = CallId::generate();
        let channel_name = id.channel_name();
        let schema_version = request.resolved_schema_version(self.config.default_schema_version);

        // Mint before writing so a misconfigured issuer leaves no orphan call.
        let initiator = self
            .issuer
            .issue(&channel_name, &doorman.id, TokenRole::Publisher, None)?;

        let now = self.clock.now();
        let call = Call {
            id: id.clone(),
            channel_name: channel_name.clone(),
            apartment_id: apartment.id.clone(),
            apartment_number: apartment.number.clone(),
            building_id: apartment.building_id.clone(),
            doorman_id: doorman.id.clone(),
            status: CallStatus::Ringing,
            started_at: now,
            answered_at: None,
            ended_at: None,
            duration_seconds: None,
            end_cause: None,
        };
        let mut participants = Vec::with_capacity(residents.len() + 1);
        participants.push(Participant {
            call_id: id.clone(),
            user_id: doorman.id.clone(),
            user_type: UserType::Doorman,
            status: ParticipantStatus::Connected,
            name: Some(doorman.full_name.clone()),
            joined_at: Some(now),
            left_at: None,
        });
        participants.extend(residents.iter().map(|r| Participant {
            call_id: id.clone(),
            user_id: r.id.clone(),
            user_type: UserType::Resident,
            status: ParticipantStatus::Invited,
            name: Some(r.full_name.clone()),
            joined_at: None,
            left_at: None,
        }));

        self.store.insert_call(&call, &participants).await?;

        let mut invite = RtmSignal::invite(&id, &doorman.id, &channel_name, schema_version);
        invite.client_version = request.client_version.clone();
        invite.context = request.context.clone();
        let targets = residents.iter().map(|r| r.id.clone()).collect::<Vec<_>>();

        info!(
            call_id = %id,
            apartment = %apartment.number,
            building_id = %apartment.building_id,
            doorman_id = %doorman.id,
            residents = targets.len(),
            "call started"
        );

        Ok(StartedCall {
            call,
            participants,
            apartment,
            doorman,
            tokens: InitiatorTokens { initiator },
            signaling: Signaling { invite, targets },
        })
    }

    /// First answer wins. Losers get [`IntercomError::InvalidState`].
    ///
    /// The answerer's token bundle is minted after the write; if minting
    /// fails the answer still stands and `tokens` is absent.
    pub async fn answer(
        &self,
        id: &CallId,
        request: &AnswerRequest,
    ) -> Result<AnsweredCall, IntercomError> {
        require(&request.user_id, "userId")?;
        parse_user_type(&request.user_type)?;

        let write = self
            .store
            .answer_call(id, &request.user_id, self.clock.now())
            .await?;
        let snapshot = match write {
            AnswerWrite::Answered(snapshot) => snapshot,
            AnswerWrite::CallMissing => return Err(IntercomError::not_found("call", id.as_str())),
            AnswerWrite::NotParticipant => {
                return Err(IntercomError::not_found("participant", request.user_id.as_str()));
            }
            AnswerWrite::NotRinging(status) => {
                debug!(call_id = %id, user_id = %request.user_id, %status, "answer lost the race");
                return Err(not_ringing(id, status));
            }
            AnswerWrite::ParticipantNotPending(status) => {
                return Err(IntercomError::invalid_state(format!(
                    "participant {} is already {status}",
                    request.user_id
                )));
            }
        };

        let tokens = match self.issuer.issue(
            &snapshot.call.channel_name,
            &request.user_id,
            TokenRole::Publisher,
            None,
        ) {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                warn!(call_id = %id, error = %e, "token mint after answer failed (non-fatal)");
                None
            }
        };

        info!(call_id = %id, user_id = %request.user_id, "call answered");
        Ok(AnsweredCall {
            call: snapshot.call,
            participants: snapshot.participants,
            tokens,
        })
    }

    /// Records a refusal. The call flips to `declined` once no resident is
    /// left who has not declined.
    pub async fn decline(
        &self,
        id: &CallId,
        request: &DeclineRequest,
    ) -> Result<DeclinedCall, IntercomError> {
        require(&request.user_id, "userId")?;
        parse_user_type(&request.user_type)?;

        match self
            .store
            .decline_call(id, &request.user_id, self.clock.now())
            .await?
        {
            DeclineWrite::Recorded {
                snapshot,
                call_declined,
            } => {
                info!(
                    call_id = %id,
                    user_id = %request.user_id,
                    reason = request.reason.as_deref().unwrap_or("declined"),
                    all_declined = call_declined,
                    "call declined"
                );
                Ok(DeclinedCall {
                    call: snapshot.call,
                    declined_by: request.user_id.clone(),
                    all_declined: call_declined,
                })
            }
            DeclineWrite::CallMissing => Err(IntercomError::not_found("call", id.as_str())),
            DeclineWrite::NotParticipant => Err(IntercomError::not_found(
                "participant",
                request.user_id.as_str(),
            )),
            DeclineWrite::NotRinging(status) => Err(not_ringing(id, status)),
        }
    }

    /// Hangs up for everyone. Ending an already-final call returns its
    /// stored snapshot with `changed = false`.
    pub async fn end(&self, id: &CallId, request: &EndRequest) -> Result<EndedCall, IntercomError> {
        require(&request.user_id, "userId")?;
        parse_user_type(&request.user_type)?;
        let cause = request
            .cause
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_END_CAUSE);

        let (snapshot, changed) = match self
            .store
            .end_call(id, Some(&request.user_id), cause, self.clock.now())
            .await?
        {
            EndWrite::Ended(snapshot) => (snapshot, true),
            EndWrite::AlreadyFinal(snapshot) => (snapshot, false),
            EndWrite::CallMissing => return Err(IntercomError::not_found("call", id.as_str())),
        };

        let duration = snapshot.call.reported_duration();
        if changed {
            info!(call_id = %id, ended_by = %request.user_id, cause, duration, "call ended");
        } else {
            debug!(call_id = %id, status = %snapshot.call.status, "end on final call ignored");
        }
        Ok(EndedCall {
            call: snapshot.call,
            ended_by: request.user_id.clone(),
            duration,
            changed,
        })
    }

    /// Read-only snapshot of a call and its participants.
    pub async fn status(&self, id: &CallId) -> Result<CallSnapshot, IntercomError> {
        self.store
            .get_call(id)
            .await?
            .ok_or_else(|| IntercomError::not_found("call", id.as_str()))
    }

    /// Paginated call history of a building, newest first.
    pub async fn history(&self, query: &HistoryQuery) -> Result<HistoryPage, IntercomError> {
        require(&query.building_id, "buildingId")?;
        if let Some(user_type) = query.user_type.as_deref().filter(|t| !t.trim().is_empty()) {
            parse_user_type(user_type)?;
        }
        let mut query = query.clone();
        query.limit = Some(self.page_limit(query.limit));
        self.store.call_history(&query).await
    }

    fn page_limit(&self, requested: Option<u32>) -> u32 {
        match requested {
            Some(0) | None => self.config.history_default_limit,
            Some(limit) => limit.min(self.config.history_max_limit),
        }
    }

    /// Ringing or active calls of a building.
    pub async fn open_calls(&self, building_id: &str) -> Result<Vec<Call>, IntercomError> {
        require(building_id, "buildingId")?;
        self.store.open_calls(building_id).await
    }

    /// Ringing calls still waiting on `user_id`.
    pub async fn pending_calls(&self, user_id: &str) -> Result<Vec<Call>, IntercomError> {
        require(user_id, "userId")?;
        self.store.pending_calls_for(user_id).await
    }

    /// Mints a fresh bundle on the channel of a live call for one of its
    /// participants.
    pub async fn token_for_call(
        &self,
        request: &CallTokenRequest,
    ) -> Result<TokenBundle, IntercomError> {
        require(&request.call_id, "callId")?;
        require(&request.uid, "uid")?;
        let id = CallId::from(request.call_id.trim());
        let snapshot = self.status(&id).await?;
        if snapshot.call.status.is_final() {
            return Err(IntercomError::invalid_state(format!(
                "call {id} is {}",
                snapshot.call.status
            )));
        }
        if snapshot.participant(&request.uid).is_none() {
            return Err(IntercomError::not_found("participant", request.uid.as_str()));
        }
        self.issuer.issue(
            &snapshot.call.channel_name,
            &request.uid,
            TokenRole::from_requested(request.role.as_deref()),
            None,
        )
    }

    /// Mints a bundle for a channel that does not belong to a call. Call
    /// channels go through [`CallService::token_for_call`], which checks
    /// participation.
    pub fn generate_token(&self, request: &TokenRequest) -> Result<TokenBundle, IntercomError> {
        let channel_name = request.channel_name.trim();
        if channel_name.starts_with(CALL_CHANNEL_PREFIX) {
            return Err(IntercomError::Validation(format!(
                "channel '{channel_name}' belongs to a call; request it through /tokens/for-call"
            )));
        }
        self.issuer.issue(
            channel_name,
            request.uid.trim(),
            TokenRole::from_requested(request.role.as_deref()),
            request.ttl_seconds,
        )
    }

    /// Checks a token against the channel and uid it is presented for.
    pub fn validate_token(
        &self,
        request: &TokenValidationRequest,
    ) -> Result<TokenValidation, IntercomError> {
        require(&request.token, "token")?;
        require(&request.channel_name, "channelName")?;
        require(&request.uid, "uid")?;
        if !self.issuer.is_configured() {
            return Err(IntercomError::upstream(
                "token issuer has no app certificate configured",
            ));
        }

        let channel_name = request.channel_name.trim();
        let uid = request.uid.trim();
        let verdict = self.issuer.validate(request.token.trim(), channel_name, uid);
        debug!(channel = %channel_name, uid = %uid, valid = verdict.is_ok(), "token validated");
        let (reason, expires_at) = match verdict {
            Ok(claims) => (None, chrono::DateTime::from_timestamp(claims.exp, 0)),
            Err(rejection) => (Some(rejection.to_string()), None),
        };
        Ok(TokenValidation {
            is_valid: reason.is_none(),
            channel_name: channel_name.to_string(),
            uid: uid.to_string(),
            reason,
            expires_at,
            validated_at: self.clock.now(),
        })
    }

    /// Ends every call that has been ringing longer than the configured
    /// ringing timeout. Returns the ids that this sweep ended.
    pub async fn sweep_unanswered(&self) -> Result<Vec<CallId>, IntercomError> {
        let now = self.clock.now();
        let timeout = i64::try_from(self.config.ringing_timeout_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| IntercomError::Config("ringing_timeout_secs out of range".into()))?;
        let stale = self.store.ringing_before(now - timeout).await?;

        let mut ended = Vec::new();
        for id in stale {
            match self.store.end_call(&id, None, TIMEOUT_END_CAUSE, now).await {
                Ok(EndWrite::Ended(_)) => ended.push(id),
                Ok(_) => {}
                Err(e) => warn!(call_id = %id, error = %e, "timing out stale call failed (non-fatal)"),
            }
        }
        if !ended.is_empty() {
            info!(count = ended.len(), "stale ringing calls ended");
        }
        Ok(ended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_fields_reject_blank_values() {
        assert!(require("302", "apartmentNumber").is_ok());
        let err = require("  ", "apartmentNumber").unwrap_err();
        assert_eq!(err.to_string(), "validation error: apartmentNumber is required");
    }

    #[test]
    fn user_type_is_required_and_checked() {
        assert_eq!(parse_user_type("resident").unwrap(), UserType::Resident);
        assert_eq!(parse_user_type(" doorman ").unwrap(), UserType::Doorman);
        let err = parse_user_type(" ").unwrap_err();
        assert_eq!(err.to_string(), "validation error: userType is required");
        assert!(matches!(
            parse_user_type("admin"),
            Err(IntercomError::Validation(_))
        ));
    }
}

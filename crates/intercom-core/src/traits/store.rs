// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence collaborator holding calls, participants and the directory.
//!
//! The three mutating call operations (`answer_call`, `decline_call`,
//! `end_call`) are each a single atomic conditional write keyed on the stored
//! call status. Implementations must never split them into a read followed by
//! an unconditional write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::api::{HistoryPage, HistoryQuery};
use crate::error::IntercomError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Apartment, Call, CallId, CallSnapshot, CallStatus, Participant, ParticipantStatus, Profile,
};

/// Outcome of the conditional answer write.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerWrite {
    /// The call flipped `ringing -> active` for this participant.
    Answered(CallSnapshot),
    /// No call with that id.
    CallMissing,
    /// The user is not a participant of the call.
    NotParticipant,
    /// The call was no longer ringing when the write ran.
    NotRinging(CallStatus),
    /// The participant already picked up, refused or was marked missed.
    ParticipantNotPending(ParticipantStatus),
}

/// Outcome of the conditional decline write.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclineWrite {
    /// The participant was marked declined. `call_declined` is true when this
    /// decline exhausted every resident and flipped the call to `declined`.
    Recorded {
        snapshot: CallSnapshot,
        call_declined: bool,
    },
    CallMissing,
    NotParticipant,
    NotRinging(CallStatus),
}

/// Outcome of the conditional end write.
#[derive(Debug, Clone, PartialEq)]
pub enum EndWrite {
    /// The call moved to `ended` during this write.
    Ended(CallSnapshot),
    /// The call had already reached a final status; nothing changed.
    AlreadyFinal(CallSnapshot),
    CallMissing,
}

/// Call Store collaborator.
#[async_trait]
pub trait CallStore: PluginAdapter {
    /// Opens the backing store and applies pending migrations.
    async fn initialize(&self) -> Result<(), IntercomError>;

    /// Flushes and closes the backing store.
    async fn close(&self) -> Result<(), IntercomError>;

    // --- Directory lookups ---

    async fn find_apartment(
        &self,
        building_id: &str,
        number: &str,
    ) -> Result<Option<Apartment>, IntercomError>;

    async fn find_profile(&self, profile_id: &str) -> Result<Option<Profile>, IntercomError>;

    /// Active resident profiles linked to an apartment.
    async fn active_residents(&self, apartment_id: &str) -> Result<Vec<Profile>, IntercomError>;

    // --- Calls ---

    /// Inserts a call and all of its participant rows in one transaction.
    async fn insert_call(
        &self,
        call: &Call,
        participants: &[Participant],
    ) -> Result<(), IntercomError>;

    async fn get_call(&self, id: &CallId) -> Result<Option<CallSnapshot>, IntercomError>;

    /// `ringing -> active` for `user_id`; pending residents other than the
    /// answerer become `missed` when the answerer is a resident.
    async fn answer_call(
        &self,
        id: &CallId,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<AnswerWrite, IntercomError>;

    /// Marks `user_id` declined and flips the call to `declined` once every
    /// resident has declined.
    async fn decline_call(
        &self,
        id: &CallId,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<DeclineWrite, IntercomError>;

    /// Ends a ringing or active call, computing the duration from the answer
    /// time. `ended_by` (if a participant) is marked disconnected.
    async fn end_call(
        &self,
        id: &CallId,
        ended_by: Option<&str>,
        cause: &str,
        at: DateTime<Utc>,
    ) -> Result<EndWrite, IntercomError>;

    // --- Reads ---

    async fn call_history(&self, query: &HistoryQuery) -> Result<HistoryPage, IntercomError>;

    /// Ringing or active calls of a building, newest first.
    async fn open_calls(&self, building_id: &str) -> Result<Vec<Call>, IntercomError>;

    /// Ringing calls where `user_id` is a still-pending resident.
    async fn pending_calls_for(&self, user_id: &str) -> Result<Vec<Call>, IntercomError>;

    /// Ids of calls still ringing that started before `cutoff`.
    async fn ringing_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<CallId>, IntercomError>;
}

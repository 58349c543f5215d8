// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-side view of the call lifecycle REST surface.

use async_trait::async_trait;

use crate::api::{
    AnswerRequest, AnsweredCall, CallTokenRequest, DeclineRequest, DeclinedCall, EndRequest,
    EndedCall, StartCallRequest, StartedCall, TokenRequest,
};
use crate::error::IntercomError;
use crate::types::{CallId, CallSnapshot, TokenBundle};

/// Operations the client state machine needs from the call service.
///
/// Implemented over HTTP for devices and in-process for tests.
#[async_trait]
pub trait CallApi: Send + Sync + 'static {
    async fn start_call(&self, request: &StartCallRequest) -> Result<StartedCall, IntercomError>;

    async fn answer_call(
        &self,
        call_id: &CallId,
        request: &AnswerRequest,
    ) -> Result<AnsweredCall, IntercomError>;

    async fn decline_call(
        &self,
        call_id: &CallId,
        request: &DeclineRequest,
    ) -> Result<DeclinedCall, IntercomError>;

    async fn end_call(
        &self,
        call_id: &CallId,
        request: &EndRequest,
    ) -> Result<EndedCall, IntercomError>;

    async fn call_status(&self, call_id: &CallId) -> Result<CallSnapshot, IntercomError>;

    async fn token_for_call(
        &self,
        request: &CallTokenRequest,
    ) -> Result<TokenBundle, IntercomError>;

    async fn generate_token(&self, request: &TokenRequest) -> Result<TokenBundle, IntercomError>;
}

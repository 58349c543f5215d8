// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process [`CallApi`] backed directly by a [`CallService`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;
use intercom_calls::CallService;
use intercom_core::api::{
    AnswerRequest, AnsweredCall, CallTokenRequest, DeclineRequest, DeclinedCall, EndRequest,
    EndedCall, StartCallRequest, StartedCall, TokenRequest,
};
use intercom_core::{CallApi, CallId, CallSnapshot, IntercomError, TokenBundle};

/// Calls the service without HTTP. Token requests can be made to fail, or
/// held until released, to exercise renewal paths.
pub struct LocalCallApi {
    service: Arc<CallService>,
    fail_tokens: AtomicBool,
    hold_tokens: watch::Sender<bool>,
    token_requests: AtomicUsize,
}

impl LocalCallApi {
    pub fn new(service: Arc<CallService>) -> Self {
        Self {
            service,
            fail_tokens: AtomicBool::new(false),
            hold_tokens: watch::Sender::new(false),
            token_requests: AtomicUsize::new(0),
        }
    }

    /// While set, both token endpoints answer with an upstream error.
    pub fn fail_token_requests(&self, fail: bool) {
        self.fail_tokens.store(fail, Ordering::SeqCst);
    }

    /// Number of token requests seen so far.
    pub fn token_requests(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }

    /// While set, token requests are counted and then park until released.
    pub fn hold_token_requests(&self, hold: bool) {
        self.hold_tokens.send_replace(hold);
    }

    async fn token_gate(&self) -> Result<(), IntercomError> {
        self.token_requests.fetch_add(1, Ordering::SeqCst);
        let mut held = self.hold_tokens.subscribe();
        if held.wait_for(|hold| !hold).await.is_err() {
            return Err(IntercomError::upstream("token service shut down"));
        }
        if self.fail_tokens.load(Ordering::SeqCst) {
            return Err(IntercomError::upstream("token service unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl CallApi for LocalCallApi {
    async fn start_call(&self, request: &StartCallRequest) -> Result<StartedCall, IntercomError> {
        self.service.start(request).await
    }

    async fn answer_call(
        &self,
        call_id: &CallId,
        request: &AnswerRequest,
    ) -> Result<AnsweredCall, IntercomError> {
        self.service.answer(call_id, request).await
    }

    async fn decline_call(
        &self,
        call_id: &CallId,
        request: &DeclineRequest,
    ) -> Result<DeclinedCall, IntercomError> {
        self.service.decline(call_id, request).await
    }

    async fn end_call(
        &self,
        call_id: &CallId,
        request: &EndRequest,
    ) -> Result<EndedCall, IntercomError> {
        self.service.end(call_id, request).await
    }

    async fn call_status(&self, call_id: &CallId) -> Result<CallSnapshot, IntercomError> {
        self.service.status(call_id).await
    }

    async fn token_for_call(
        &self,
        request: &CallTokenRequest,
    ) -> Result<TokenBundle, IntercomError> {
        self.token_gate().await?;
        self.service.token_for_call(request).await
    }

    async fn generate_token(&self, request: &TokenRequest) -> Result<TokenBundle, IntercomError> {
        self.token_gate().await?;
        self.service.generate_token(request)
    }
}

// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`CallApi`] over the gateway's REST surface.
//!
//! Error bodies (`{"error": ..., "kind": ...}`) are mapped back onto
//! [`IntercomError`] so the state machine can tell a lost race from a
//! transport failure.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use intercom_config::ClientConfig;
use intercom_core::api::{
    AnswerRequest, AnsweredCall, CallTokenRequest, DeclineRequest, DeclinedCall, EndRequest,
    EndedCall, StartCallRequest, StartedCall, TokenRequest, USER_HEADER,
};
use intercom_core::{CallApi, CallId, CallSnapshot, ErrorKind, IntercomError, TokenBundle};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    kind: Option<String>,
}

/// HTTP client for one signed-in user.
#[derive(Debug, Clone)]
pub struct HttpCallApi {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpCallApi {
    /// Builds a client that identifies as `user_id` and authenticates with
    /// `bearer_token` when given.
    pub fn new(
        config: &ClientConfig,
        user_id: &str,
        bearer_token: Option<&str>,
    ) -> Result<Self, IntercomError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = bearer_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                    IntercomError::Config(format!("invalid bearer token header value: {e}"))
                })?,
            );
        }
        headers.insert(
            USER_HEADER,
            HeaderValue::from_str(user_id)
                .map_err(|e| IntercomError::Config(format!("invalid user id header value: {e}")))?,
        );

        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| IntercomError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn transport_error(&self, e: reqwest::Error) -> IntercomError {
        if e.is_timeout() {
            IntercomError::Timeout {
                duration: self.timeout,
            }
        } else {
            IntercomError::NetworkTransient {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            }
        }
    }

    /// Sends `request`; `subject` names what a 404 refers to.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        subject: (&'static str, &str),
    ) -> Result<T, IntercomError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        debug!(status = %status, "call api response");

        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| IntercomError::Upstream {
                    message: format!("failed to parse API response: {e}"),
                    source: Some(Box::new(e)),
                });
        }

        let body = response.text().await.unwrap_or_default();
        Err(decode_failure(status, &body, subject))
    }
}

/// Maps a non-success response onto the error taxonomy.
fn decode_failure(status: StatusCode, body: &str, subject: (&'static str, &str)) -> IntercomError {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok();
    let kind = parsed
        .as_ref()
        .and_then(|b| b.kind.as_deref())
        .and_then(|k| ErrorKind::from_str(k).ok());
    let message = parsed
        .map(|b| b.error)
        .unwrap_or_else(|| format!("API returned {status}: {body}"));
    let (entity, id) = subject;

    match kind {
        Some(ErrorKind::NotFound) => IntercomError::not_found(entity, id),
        Some(ErrorKind::InvalidState) => IntercomError::invalid_state(message),
        Some(ErrorKind::Validation) => IntercomError::Validation(message),
        Some(ErrorKind::NoResidents) => IntercomError::NoResidents {
            apartment_id: id.to_string(),
        },
        _ => match status {
            StatusCode::NOT_FOUND => IntercomError::not_found(entity, id),
            StatusCode::BAD_REQUEST => IntercomError::Validation(message),
            StatusCode::CONFLICT => IntercomError::invalid_state(message),
            _ => IntercomError::upstream(format!("API returned {status}: {message}")),
        },
    }
}

#[async_trait]
impl CallApi for HttpCallApi {
    async fn start_call(&self, request: &StartCallRequest) -> Result<StartedCall, IntercomError> {
        let http = self.client.post(self.url("/calls/start")).json(request);
        self.send(http, ("apartment", request.apartment_number.as_str()))
            .await
    }

    async fn answer_call(
        &self,
        call_id: &CallId,
        request: &AnswerRequest,
    ) -> Result<AnsweredCall, IntercomError> {
        let http = self
            .client
            .post(self.url(&format!("/calls/{call_id}/answer")))
            .json(request);
        self.send(http, ("call", call_id.as_str())).await
    }

    async fn decline_call(
        &self,
        call_id: &CallId,
        request: &DeclineRequest,
    ) -> Result<DeclinedCall, IntercomError> {
        let http = self
            .client
            .post(self.url(&format!("/calls/{call_id}/decline")))
            .json(request);
        self.send(http, ("call", call_id.as_str())).await
    }

    async fn end_call(
        &self,
        call_id: &CallId,
        request: &EndRequest,
    ) -> Result<EndedCall, IntercomError> {
        let http = self
            .client
            .post(self.url(&format!("/calls/{call_id}/end")))
            .json(request);
        self.send(http, ("call", call_id.as_str())).await
    }

    async fn call_status(&self, call_id: &CallId) -> Result<CallSnapshot, IntercomError> {
        let http = self
            .client
            .get(self.url(&format!("/calls/{call_id}/status")));
        self.send(http, ("call", call_id.as_str())).await
    }

    async fn token_for_call(
        &self,
        request: &CallTokenRequest,
    ) -> Result<TokenBundle, IntercomError> {
        let http = self.client.post(self.url("/tokens/for-call")).json(request);
        self.send(http, ("call", request.call_id.as_str())).await
    }

    async fn generate_token(&self, request: &TokenRequest) -> Result<TokenBundle, IntercomError> {
        let http = self.client.post(self.url("/tokens/generate")).json(request);
        self.send(http, ("channel", request.channel_name.as_str()))
            .await
    }
}

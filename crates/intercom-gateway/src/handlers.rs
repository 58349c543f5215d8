// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the call and token endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use intercom_core::api::{
    AnswerRequest, AnsweredCall, CallTokenRequest, DeclineRequest, DeclinedCall, EndRequest,
    EndedCall, HistoryPage, HistoryQuery, StartCallRequest, StartedCall, TokenRequest,
    TokenValidation, TokenValidationRequest,
};
use intercom_core::{Call, CallId, CallSnapshot, HealthStatus, PluginAdapter, TokenBundle};
use serde::{Deserialize, Serialize};

use crate::auth::require_identity;
use crate::error::ApiError;
use crate::server::GatewayState;

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy`, `degraded` or `unhealthy`.
    pub status: String,
    /// Binary version.
    pub version: String,
    /// Seconds since the gateway started.
    pub uptime_secs: u64,
    /// Detail reported by the store when not healthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Response body for the call list endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct CallList {
    pub calls: Vec<Call>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingParams {
    #[serde(default)]
    pub building_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserParams {
    #[serde(default)]
    pub user_id: String,
}

/// GET /health
///
/// Unauthenticated. Reports `503` when the store is unhealthy.
pub async fn get_health(State(state): State<GatewayState>) -> Response {
    let (status, label, detail) = match state.service.store().health_check().await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "healthy", None),
        Ok(HealthStatus::Degraded(d)) => (StatusCode::OK, "degraded", Some(d)),
        Ok(HealthStatus::Unhealthy(d)) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", Some(d)),
        Err(e) => {
            tracing::warn!(error = %e, "store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "unhealthy",
                Some("store health check failed".to_string()),
            )
        }
    };
    let body = HealthResponse {
        status: label.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        detail,
    };
    (status, Json(body)).into_response()
}

/// POST /calls/start
pub async fn post_start(
    State(state): State<GatewayState>,
    Json(body): Json<StartCallRequest>,
) -> Result<(StatusCode, Json<StartedCall>), ApiError> {
    let started = state.service.start(&body).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// POST /calls/{id}/answer
pub async fn post_answer(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<AnswerRequest>,
) -> Result<Json<AnsweredCall>, ApiError> {
    Ok(Json(state.service.answer(&CallId(id), &body).await?))
}

/// POST /calls/{id}/decline
pub async fn post_decline(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<DeclineRequest>,
) -> Result<Json<DeclinedCall>, ApiError> {
    Ok(Json(state.service.decline(&CallId(id), &body).await?))
}

/// POST /calls/{id}/end
pub async fn post_end(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<EndRequest>,
) -> Result<Json<EndedCall>, ApiError> {
    Ok(Json(state.service.end(&CallId(id), &body).await?))
}

/// GET /calls/{id}/status
pub async fn get_status(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<CallSnapshot>, ApiError> {
    Ok(Json(state.service.status(&CallId(id)).await?))
}

/// GET /calls/history
pub async fn get_history(
    State(state): State<GatewayState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, ApiError> {
    Ok(Json(state.service.history(&query).await?))
}

/// GET /calls/active?buildingId=
pub async fn get_active(
    State(state): State<GatewayState>,
    Query(params): Query<BuildingParams>,
) -> Result<Json<CallList>, ApiError> {
    let calls = state.service.open_calls(&params.building_id).await?;
    Ok(Json(CallList { calls }))
}

/// GET /calls/pending?userId=
pub async fn get_pending(
    State(state): State<GatewayState>,
    Query(params): Query<UserParams>,
) -> Result<Json<CallList>, ApiError> {
    let calls = state.service.pending_calls(&params.user_id).await?;
    Ok(Json(CallList { calls }))
}

/// POST /tokens/generate
pub async fn post_generate_token(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(body): Json<TokenRequest>,
) -> Response {
    if let Err(rejected) = require_identity(&headers, &body.uid) {
        return rejected;
    }
    respond(state.service.generate_token(&body))
}

/// POST /tokens/for-call
pub async fn post_token_for_call(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(body): Json<CallTokenRequest>,
) -> Response {
    if let Err(rejected) = require_identity(&headers, &body.uid) {
        return rejected;
    }
    respond(state.service.token_for_call(&body).await)
}

/// POST /tokens/validate
pub async fn post_validate_token(
    State(state): State<GatewayState>,
    Json(body): Json<TokenValidationRequest>,
) -> Result<Json<TokenValidation>, ApiError> {
    Ok(Json(state.service.validate_token(&body)?))
}

fn respond(result: Result<TokenBundle, intercom_core::IntercomError>) -> Response {
    match result {
        Ok(bundle) => Json(bundle).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

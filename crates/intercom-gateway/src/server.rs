// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use intercom_calls::CallService;
use intercom_config::ServerConfig;
use intercom_core::IntercomError;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// The call lifecycle service.
    pub service: Arc<CallService>,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Process start time for uptime calculation.
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(service: Arc<CallService>, bearer_token: Option<String>) -> Self {
        Self {
            service,
            auth: AuthConfig { bearer_token },
            start_time: Instant::now(),
        }
    }
}

/// Builds the gateway router.
///
/// - GET /health (public)
/// - POST /calls/start, /calls/{id}/answer, /calls/{id}/decline, /calls/{id}/end
/// - GET /calls/{id}/status, /calls/history, /calls/active, /calls/pending
/// - POST /tokens/generate, /tokens/for-call, /tokens/validate
pub fn router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/calls/start", post(handlers::post_start))
        .route("/calls/history", get(handlers::get_history))
        .route("/calls/active", get(handlers::get_active))
        .route("/calls/pending", get(handlers::get_pending))
        .route("/calls/{id}/answer", post(handlers::post_answer))
        .route("/calls/{id}/decline", post(handlers::post_decline))
        .route("/calls/{id}/end", post(handlers::post_end))
        .route("/calls/{id}/status", get(handlers::get_status))
        .route("/tokens/generate", post(handlers::post_generate_token))
        .route("/tokens/for-call", post(handlers::post_token_for_call))
        .route("/tokens/validate", post(handlers::post_validate_token))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Binds the configured host:port.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, IntercomError> {
    let addr = format!("{}:{}", config.host, config.port);
    TcpListener::bind(&addr)
        .await
        .map_err(|e| IntercomError::Config(format!("failed to bind gateway to {addr}: {e}")))
}

/// Serves the gateway on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), IntercomError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Gateway server listening on {addr}");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| IntercomError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("Gateway server stopped");
    Ok(())
}

/// Binds and serves in one step.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), IntercomError> {
    let listener = bind(config).await?;
    serve(listener, state, cancel).await
}

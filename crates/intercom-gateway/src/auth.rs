// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authentication for the gateway.
//!
//! Every API route requires `Authorization: Bearer <token>` matching the
//! configured token. When no token is configured all requests are rejected
//! (fail-closed). Token endpoints additionally require the caller identity
//! header to name the uid being minted for.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use intercom_core::api::USER_HEADER;

use crate::error::ErrorResponse;

/// Authentication configuration for the gateway.
#[derive(Clone)]
pub struct AuthConfig {
    /// Expected bearer token. `None` rejects every request.
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// Middleware that validates the bearer token.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = auth.bearer_token.as_deref() else {
        tracing::error!("gateway has no bearer token configured -- rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let presented = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

/// The caller identity header, trimmed. `None` when missing or empty.
pub fn caller_identity(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Rejects with `403` unless the caller identity equals `uid`.
pub fn require_identity(headers: &HeaderMap, uid: &str) -> Result<(), Response> {
    match caller_identity(headers) {
        Some(caller) if caller == uid.trim() => Ok(()),
        caller => {
            tracing::warn!(
                caller = caller.unwrap_or("<none>"),
                uid,
                "token request for another identity rejected"
            );
            Err((
                StatusCode::FORBIDDEN,
                Json(ErrorResponse::new("caller identity does not match uid")),
            )
                .into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn auth_config_debug_redacts_token() {
        let config = AuthConfig {
            bearer_token: Some("secret-token".to_string()),
        };
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("secret-token"));
        assert!(debug_output.contains("[redacted]"));
    }

    #[test]
    fn identity_must_match_uid() {
        let mut headers = HeaderMap::new();
        assert!(require_identity(&headers, "r1").is_err());

        headers.insert(USER_HEADER, HeaderValue::from_static(" r1 "));
        assert_eq!(caller_identity(&headers), Some("r1"));
        assert!(require_identity(&headers, "r1").is_ok());

        let rejected = require_identity(&headers, "r2").unwrap_err();
        assert_eq!(rejected.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn blank_identity_counts_as_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_static("  "));
        assert_eq!(caller_identity(&headers), None);
    }
}

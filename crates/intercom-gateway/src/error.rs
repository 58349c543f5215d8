// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping of [`IntercomError`] onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use intercom_core::{ErrorKind, IntercomError};
use serde::Serialize;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error description.
    pub error: String,
    /// Machine-readable error kind; absent for internal failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: None,
        }
    }
}

/// Handler error wrapper.
#[derive(Debug)]
pub struct ApiError(pub IntercomError);

impl From<IntercomError> for ApiError {
    fn from(e: IntercomError) -> Self {
        Self(e)
    }
}

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Validation | ErrorKind::InvalidState | ErrorKind::NoResidents => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        let body = if status.is_server_error() {
            tracing::error!(error = %self.0, kind = %kind, "request failed");
            ErrorResponse::new("internal server error")
        } else {
            tracing::debug!(error = %self.0, kind = %kind, "request rejected");
            ErrorResponse {
                error: self.0.to_string(),
                kind: Some(kind.to_string()),
            }
        };
        (status, Json(body)).into_response()
    }
}

// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the intercom call core.

use strum::{Display, EnumString};
use thiserror::Error;

/// The primary error type shared by the call service, the stores, the SDK
/// adapters and the client state machine.
#[derive(Debug, Error)]
pub enum IntercomError {
    /// A call, apartment, profile or participant does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The operation is not legal from the call's current status.
    ///
    /// This is what the loser of a concurrent answer receives.
    #[error("invalid state: {message}")]
    InvalidState { message: String },

    /// A required field is missing or malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// The apartment has no active residents to ring.
    #[error("no residents found for apartment {apartment_id}")]
    NoResidents { apartment_id: String },

    /// Token issuer, media SDK or messaging SDK failure.
    #[error("upstream error: {message}")]
    Upstream {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Delivery failure that leaves authoritative state untouched (peer signals).
    #[error("transient network error: {message}")]
    NetworkTransient {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Storage backend errors (connection, query failure, row decoding).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors detected at runtime.
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`IntercomError`], used for logging and
/// transport mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Validation,
    NoResidents,
    Upstream,
    NetworkTransient,
    Storage,
    Config,
    Timeout,
    Internal,
}

impl IntercomError {
    /// Shorthand for [`IntercomError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Shorthand for [`IntercomError::InvalidState`].
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Shorthand for an [`IntercomError::Upstream`] without a source error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            source: None,
        }
    }

    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NoResidents { .. } => ErrorKind::NoResidents,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::NetworkTransient { .. } => ErrorKind::NetworkTransient,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Config(_) => ErrorKind::Config,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when the failure is a structured rejection the caller caused
    /// (`NotFound`, `InvalidState`, `Validation`, `NoResidents`).
    ///
    /// These are never retried automatically.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound
                | ErrorKind::InvalidState
                | ErrorKind::Validation
                | ErrorKind::NoResidents
        )
    }

    /// True for delivery failures that may succeed when simply tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NetworkTransient | ErrorKind::Timeout
        )
    }

    /// True when this is the "someone else already answered" outcome.
    pub fn is_race_lost(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_every_variant() {
        let cases = [
            (IntercomError::not_found("call", "c1"), ErrorKind::NotFound),
            (IntercomError::invalid_state("x"), ErrorKind::InvalidState),
            (IntercomError::Validation("x".into()), ErrorKind::Validation),
            (
                IntercomError::NoResidents {
                    apartment_id: "a".into(),
                },
                ErrorKind::NoResidents,
            ),
            (IntercomError::upstream("x"), ErrorKind::Upstream),
            (
                IntercomError::NetworkTransient {
                    message: "x".into(),
                    source: None,
                },
                ErrorKind::NetworkTransient,
            ),
            (
                IntercomError::Storage {
                    source: Box::new(std::io::Error::other("disk")),
                },
                ErrorKind::Storage,
            ),
            (IntercomError::Config("x".into()), ErrorKind::Config),
            (
                IntercomError::Timeout {
                    duration: std::time::Duration::from_secs(1),
                },
                ErrorKind::Timeout,
            ),
            (IntercomError::Internal("x".into()), ErrorKind::Internal),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn rejections_are_not_transport_failures() {
        assert!(IntercomError::not_found("call", "c1").is_rejection());
        assert!(IntercomError::invalid_state("answered").is_rejection());
        assert!(!IntercomError::upstream("sdk down").is_rejection());
        assert!(!IntercomError::Internal("boom".into()).is_rejection());
    }

    #[test]
    fn only_transport_failures_are_retryable() {
        let transient = IntercomError::NetworkTransient {
            message: "peer offline".into(),
            source: None,
        };
        assert!(transient.is_retryable());
        assert!(!IntercomError::invalid_state("x").is_retryable());
        assert!(!IntercomError::upstream("x").is_retryable());
    }

    #[test]
    fn race_lost_is_invalid_state_only() {
        assert!(IntercomError::invalid_state("already active").is_race_lost());
        assert!(!IntercomError::not_found("call", "c1").is_race_lost());
    }

    #[test]
    fn not_found_message_names_entity() {
        let err = IntercomError::not_found("apartment", "302");
        assert_eq!(err.to_string(), "apartment not found: 302");
    }

    #[test]
    fn error_kind_display_is_snake_case() {
        assert_eq!(ErrorKind::InvalidState.to_string(), "invalid_state");
        assert_eq!(ErrorKind::NetworkTransient.to_string(), "network_transient");
    }
}

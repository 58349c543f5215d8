// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token Issuer for the intercom call core.
//!
//! Mints short-lived [`intercom_core::TokenBundle`]s whose media and
//! messaging tokens are HMAC-signed and scoped to one channel, uid and role.

pub mod claims;
pub mod issuer;

use thiserror::Error;

pub use claims::{TokenClaims, TokenKind};
pub use issuer::TokenIssuer;

/// Why a presented token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenRejection {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token was issued for another application")]
    WrongApp,
    #[error("token was issued for another channel")]
    WrongChannel,
    #[error("token was issued for another uid")]
    WrongUid,
    #[error("token kind does not match its slot")]
    WrongKind,
    #[error("token has expired")]
    Expired,
}

// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signed token wire format.
//!
//! A token is `v1.<claims>.<mac>` where `<claims>` is the URL-safe base64 of
//! the claims JSON and `<mac>` is the hex HMAC-SHA256 of `v1.<claims>` keyed
//! with the app certificate.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use intercom_core::TokenRole;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::TokenRejection;

type HmacSha256 = Hmac<Sha256>;

const VERSION: &str = "v1";

/// Which transport a token unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Media (audio) channel.
    Rtc,
    /// Peer messaging.
    Rtm,
}

/// Claims carried inside a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub kind: TokenKind,
    pub app: String,
    pub channel: String,
    pub uid: String,
    pub role: TokenRole,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Expiry, Unix seconds.
    pub exp: i64,
    /// Random per-mint value; two mints never produce the same token.
    pub nonce: String,
}

fn mac_for(secret: &[u8], signed: &str) -> Result<HmacSha256, TokenRejection> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenRejection::Malformed)?;
    mac.update(signed.as_bytes());
    Ok(mac)
}

/// Serializes and signs `claims`.
pub(crate) fn sign(claims: &TokenClaims, secret: &[u8]) -> Result<String, TokenRejection> {
    let json = serde_json::to_vec(claims).map_err(|_| TokenRejection::Malformed)?;
    let signed = format!("{VERSION}.{}", URL_SAFE_NO_PAD.encode(json));
    let tag = mac_for(secret, &signed)?.finalize().into_bytes();
    Ok(format!("{signed}.{}", hex::encode(tag)))
}

/// Checks the signature of `token` and returns its claims.
///
/// Expiry and scope are not checked here.
pub(crate) fn verify(token: &str, secret: &[u8]) -> Result<TokenClaims, TokenRejection> {
    let (signed, tag_hex) = token.rsplit_once('.').ok_or(TokenRejection::Malformed)?;
    let (version, payload) = signed.split_once('.').ok_or(TokenRejection::Malformed)?;
    if version != VERSION {
        return Err(TokenRejection::Malformed);
    }
    let tag = hex::decode(tag_hex).map_err(|_| TokenRejection::Malformed)?;
    mac_for(secret, signed)?
        .verify_slice(&tag)
        .map_err(|_| TokenRejection::BadSignature)?;
    let json = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenRejection::Malformed)?;
    serde_json::from_slice(&json).map_err(|_| TokenRejection::Malformed)
}

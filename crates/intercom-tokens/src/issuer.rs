// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token Issuer: mints and validates channel-scoped token bundles.

use std::sync::Arc;

use chrono::{Duration, SubsecRound};
use intercom_config::model::TokenConfig;
use intercom_core::{Clock, IntercomError, SystemClock, TokenBundle, TokenRole};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::TokenRejection;
use crate::claims::{self, TokenClaims, TokenKind};

/// Mints media and messaging tokens for `(channel, uid, role)` triples.
pub struct TokenIssuer {
    app_id: String,
    certificate: Option<SecretString>,
    default_ttl_secs: u64,
    max_ttl_secs: u64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("app_id", &self.app_id)
            .field("certificate", &self.certificate.as_ref().map(|_| "[redacted]"))
            .field("default_ttl_secs", &self.default_ttl_secs)
            .field("max_ttl_secs", &self.max_ttl_secs)
            .finish()
    }
}

impl TokenIssuer {
    /// Builds an issuer from the `[tokens]` config section and the system clock.
    pub fn from_config(config: &TokenConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Builds an issuer reading time from `clock`.
    pub fn with_clock(config: &TokenConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            app_id: config.app_id.clone().unwrap_or_default(),
            certificate: config
                .app_certificate
                .clone()
                .filter(|c| !c.is_empty())
                .map(SecretString::from),
            default_ttl_secs: config.default_ttl_secs,
            max_ttl_secs: config.max_ttl_secs.max(config.default_ttl_secs),
            clock,
        }
    }

    /// Whether a signing certificate is configured.
    pub fn is_configured(&self) -> bool {
        self.certificate.is_some()
    }

    /// TTL applied for a requested value: absent or non-positive picks the
    /// default, anything above the maximum is clamped.
    pub fn resolve_ttl(&self, requested: Option<i64>) -> u64 {
        match requested {
            Some(ttl) if ttl > 0 => (ttl as u64).min(self.max_ttl_secs),
            _ => self.default_ttl_secs,
        }
    }

    /// Mints a fresh bundle. Every call produces new tokens.
    pub fn issue(
        &self,
        channel_name: &str,
        uid: &str,
        role: TokenRole,
        ttl_seconds: Option<i64>,
    ) -> Result<TokenBundle, IntercomError> {
        if channel_name.trim().is_empty() {
            return Err(IntercomError::Validation("channelName is required".into()));
        }
        if uid.trim().is_empty() {
            return Err(IntercomError::Validation("uid is required".into()));
        }
        let secret = self
            .certificate
            .as_ref()
            .ok_or_else(|| IntercomError::upstream("token issuer has no app certificate configured"))?;

        let ttl = self.resolve_ttl(ttl_seconds);
        let issued_at = self.clock.now().trunc_subsecs(0);
        let ttl_delta = i64::try_from(ttl)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| IntercomError::Internal(format!("ttl {ttl}s out of range")))?;
        let expires_at = issued_at + ttl_delta;

        let mint = |kind| {
            let claims = TokenClaims {
                kind,
                app: self.app_id.clone(),
                channel: channel_name.to_string(),
                uid: uid.to_string(),
                role,
                iat: issued_at.timestamp(),
                exp: expires_at.timestamp(),
                nonce: uuid::Uuid::new_v4().simple().to_string(),
            };
            claims::sign(&claims, secret.expose_secret().as_bytes()).map_err(|e| IntercomError::Upstream {
                message: "failed to sign token".into(),
                source: Some(Box::new(e)),
            })
        };

        let bundle = TokenBundle {
            rtc_token: mint(TokenKind::Rtc)?,
            rtm_token: mint(TokenKind::Rtm)?,
            uid: uid.to_string(),
            channel_name: channel_name.to_string(),
            role,
            issued_at,
            expires_at,
            ttl_seconds: ttl,
        };
        debug!(channel = %channel_name, uid = %uid, role = %role, ttl, "token bundle issued");
        Ok(bundle)
    }

    /// Checks that `token` was minted by this issuer for `channel_name` and
    /// `uid` and has not expired.
    pub fn validate(
        &self,
        token: &str,
        channel_name: &str,
        uid: &str,
    ) -> Result<TokenClaims, TokenRejection> {
        let secret = self.certificate.as_ref().ok_or(TokenRejection::BadSignature)?;
        let claims = claims::verify(token, secret.expose_secret().as_bytes())?;
        if claims.app != self.app_id {
            return Err(TokenRejection::WrongApp);
        }
        if claims.channel != channel_name {
            return Err(TokenRejection::WrongChannel);
        }
        if claims.uid != uid {
            return Err(TokenRejection::WrongUid);
        }
        if self.clock.now().timestamp() >= claims.exp {
            return Err(TokenRejection::Expired);
        }
        Ok(claims)
    }

    /// Validates both halves of a bundle against its own scope.
    pub fn validate_bundle(&self, bundle: &TokenBundle) -> Result<(), TokenRejection> {
        let rtc = self.validate(&bundle.rtc_token, &bundle.channel_name, &bundle.uid)?;
        let rtm = self.validate(&bundle.rtm_token, &bundle.channel_name, &bundle.uid)?;
        if rtc.kind != TokenKind::Rtc || rtm.kind != TokenKind::Rtm {
            return Err(TokenRejection::WrongKind);
        }
        Ok(())
    }
}

// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests for token scoping and expiry arithmetic.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use intercom_config::model::TokenConfig;
use intercom_core::{Clock, TokenRole};
use intercom_tokens::{TokenIssuer, TokenRejection};
use proptest::prelude::*;

struct At(DateTime<Utc>);

impl Clock for At {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn issuer(now_ms: i64) -> TokenIssuer {
    let config = TokenConfig {
        app_id: Some("intercom-app".into()),
        app_certificate: Some("0123456789abcdef".into()),
        default_ttl_secs: 300,
        max_ttl_secs: 3600,
    };
    let now = Utc
        .timestamp_millis_opt(now_ms)
        .single()
        .unwrap_or_else(Utc::now);
    TokenIssuer::with_clock(&config, Arc::new(At(now)))
}

fn ident() -> impl Strategy<Value = String> {
    "[a-z0-9-]{1,24}"
}

proptest! {
    #[test]
    fn expiry_minus_issue_is_the_resolved_ttl(
        now_ms in 1_600_000_000_000i64..1_900_000_000_000i64,
        ttl in proptest::option::of(-100i64..10_000),
    ) {
        let issuer = issuer(now_ms);
        let bundle = issuer.issue("call-x", "u1", TokenRole::Publisher, ttl).unwrap();
        prop_assert_eq!(bundle.ttl_seconds, issuer.resolve_ttl(ttl));
        prop_assert!(bundle.ttl_seconds > 0 && bundle.ttl_seconds <= 3600);
        prop_assert_eq!(
            (bundle.expires_at - bundle.issued_at).num_seconds(),
            bundle.ttl_seconds as i64
        );
    }

    #[test]
    fn bundle_never_validates_outside_its_scope(
        channel in ident(),
        uid in ident(),
        other_channel in ident(),
        other_uid in ident(),
    ) {
        let issuer = issuer(1_700_000_000_000);
        let bundle = issuer.issue(&channel, &uid, TokenRole::Publisher, None).unwrap();
        prop_assert!(bundle.is_scoped_to(&channel, &uid));
        prop_assert!(issuer.validate(&bundle.rtc_token, &channel, &uid).is_ok());

        if other_channel != channel {
            prop_assert_eq!(
                issuer.validate(&bundle.rtc_token, &other_channel, &uid).unwrap_err(),
                TokenRejection::WrongChannel
            );
            prop_assert!(issuer.validate(&bundle.rtm_token, &other_channel, &uid).is_err());
        }
        if other_uid != uid {
            prop_assert_eq!(
                issuer.validate(&bundle.rtm_token, &channel, &other_uid).unwrap_err(),
                TokenRejection::WrongUid
            );
            prop_assert!(issuer.validate(&bundle.rtc_token, &channel, &other_uid).is_err());
        }
    }
}

#[test]
fn tokens_from_another_issuer_are_rejected() {
    let ours = issuer(1_700_000_000_000);
    let theirs = TokenIssuer::with_clock(
        &TokenConfig {
            app_id: Some("intercom-app".into()),
            app_certificate: Some("another-secret".into()),
            default_ttl_secs: 300,
            max_ttl_secs: 3600,
        },
        Arc::new(At(Utc::now())),
    );
    let bundle = theirs
        .issue("call-1", "r1", TokenRole::Publisher, None)
        .unwrap();
    assert_eq!(
        ours.validate(&bundle.rtc_token, "call-1", "r1").unwrap_err(),
        TokenRejection::BadSignature
    );
}

#[test]
fn rtc_token_cannot_stand_in_for_rtm_slot() {
    let issuer = issuer(1_700_000_000_000);
    let mut bundle = issuer
        .issue("call-1", "r1", TokenRole::Subscriber, None)
        .unwrap();
    bundle.rtm_token = bundle.rtc_token.clone();
    assert_eq!(
        issuer.validate_bundle(&bundle).unwrap_err(),
        TokenRejection::WrongKind
    );
}

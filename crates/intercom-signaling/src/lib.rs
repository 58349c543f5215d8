// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Peer Signaling Channel.
//!
//! Carries INVITE/ANSWER/DECLINE/END between clients over the messaging SDK.
//! Delivery is at most once per send and never retried; the REST surface
//! stays the source of truth, so failures here are logged and swallowed.

use std::collections::HashSet;
use std::sync::Arc;

use intercom_bus::{SdkEvent, SdkEventBus, Subscription};
use intercom_core::{IntercomError, MessagingAdapter, RtmSignal};
use tracing::{debug, warn};

/// Outcome of one [`SignalingChannel::send`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Targets the SDK accepted the message for.
    pub delivered: Vec<String>,
    /// Targets that failed, with the error text.
    pub failed: Vec<(String, String)>,
}

impl SendReport {
    pub fn all_failed(&self) -> bool {
        self.delivered.is_empty() && !self.failed.is_empty()
    }
}

/// Decodes one inbound payload. Anything that is not a well-formed signal
/// yields `None`.
pub fn decode_signal(text: &str) -> Option<RtmSignal> {
    match RtmSignal::from_json(text) {
        Ok(signal) => Some(signal),
        Err(e) => {
            debug!(error = %e, len = text.len(), "dropping undecodable peer message");
            None
        }
    }
}

/// De-duplicates targets, keeping first-seen order and dropping blanks and
/// `exclude`.
pub fn normalize_targets<'a>(
    targets: impl IntoIterator<Item = &'a str>,
    exclude: Option<&str>,
) -> Vec<String> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty() && Some(*t) != exclude)
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

/// Thin wrapper over a [`MessagingAdapter`] and the bus it reports on.
#[derive(Clone)]
pub struct SignalingChannel {
    messaging: Arc<dyn MessagingAdapter>,
    bus: SdkEventBus,
}

impl SignalingChannel {
    pub fn new(messaging: Arc<dyn MessagingAdapter>, bus: SdkEventBus) -> Self {
        Self { messaging, bus }
    }

    /// Logs into the messaging service as `uid`.
    pub async fn login(&self, uid: &str, token: &str) -> Result<(), IntercomError> {
        self.messaging.login(uid, token).await?;
        debug!(uid = %uid, "signaling login");
        Ok(())
    }

    /// Logs out. Failures are logged only.
    pub async fn logout(&self) {
        if let Err(e) = self.messaging.logout().await {
            warn!(error = %e, "signaling logout failed (non-fatal)");
        }
    }

    /// Fire-and-forget delivery of `signal` to every distinct target except
    /// the sender. Never fails; inspect the report for partial delivery.
    pub async fn send(&self, targets: &[String], signal: &RtmSignal) -> SendReport {
        let targets = normalize_targets(
            targets.iter().map(String::as_str),
            Some(signal.from.as_str()),
        );
        let mut report = SendReport::default();
        if targets.is_empty() {
            debug!(call_id = %signal.call_id, kind = %signal.signal_type, "no signal targets");
            return report;
        }

        let payload = match signal.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(call_id = %signal.call_id, error = %e, "signal encode failed (non-fatal)");
                report.failed = targets.into_iter().map(|t| (t, e.to_string())).collect();
                return report;
            }
        };

        for target in targets {
            match self.messaging.send_peer_message(&target, &payload).await {
                Ok(()) => report.delivered.push(target),
                Err(e) => {
                    warn!(
                        call_id = %signal.call_id,
                        kind = %signal.signal_type,
                        target = %target,
                        error = %e,
                        "signal delivery failed (non-fatal)"
                    );
                    report.failed.push((target, e.to_string()));
                }
            }
        }
        debug!(
            call_id = %signal.call_id,
            kind = %signal.signal_type,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "signal sent"
        );
        report
    }

    /// Calls `handler` for every decodable inbound signal until the returned
    /// subscription is dropped.
    #[must_use = "dropping the subscription stops delivery"]
    pub fn on_signal<F>(&self, handler: F) -> Subscription
    where
        F: Fn(RtmSignal) + Send + Sync + 'static,
    {
        self.bus.subscribe(move |event| {
            if let SdkEvent::PeerMessage { text, .. } = event {
                if let Some(signal) = decode_signal(text) {
                    handler(signal);
                }
            }
        })
    }
}

// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local call state and the pure parts of its transition rules.
//!
//! Everything here is synchronous and side-effect free; the actor in
//! [`crate::actor`] owns one [`LocalCall`] and applies these rules while
//! performing the I/O they call for.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use intercom_core::{CallId, RtmSignal, SignalType, TokenBundle, UserType};
use strum::Display;

/// Phase of the local call as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CallPhase {
    #[default]
    Idle,
    Dialing,
    Ringing,
    Connecting,
    Connected,
    Ending,
    Ended,
}

impl CallPhase {
    /// Phases in which a call is being set up or is up.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            CallPhase::Dialing | CallPhase::Ringing | CallPhase::Connecting | CallPhase::Connected
        )
    }

    /// Phases from which a new call may begin.
    pub fn is_available(self) -> bool {
        matches!(self, CallPhase::Idle | CallPhase::Ended)
    }
}

/// Who placed the call, from this device's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Identity the state machine acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub user_id: String,
    pub user_type: UserType,
}

impl ClientContext {
    pub fn doorman(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_type: UserType::Doorman,
        }
    }

    pub fn resident(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_type: UserType::Resident,
        }
    }

    /// Name of the messaging channel used while waiting for invites.
    pub fn standby_channel(&self) -> String {
        format!("standby-{}", self.user_id)
    }
}

/// An INVITE this device has received and not yet acted on.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInvite {
    pub call_id: CallId,
    pub from: String,
    pub channel_name: String,
    pub version: u32,
    pub received_at: DateTime<Utc>,
}

impl PendingInvite {
    pub fn from_signal(signal: &RtmSignal, received_at: DateTime<Utc>) -> Self {
        Self {
            call_id: signal.call_id.clone(),
            from: signal.from.clone(),
            channel_name: signal
                .channel
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| signal.call_id.channel_name()),
            version: signal.version,
            received_at,
        }
    }
}

/// The call this device is taking part in.
#[derive(Debug, Clone)]
pub struct ActiveCall {
    pub call_id: CallId,
    pub channel_name: String,
    pub direction: Direction,
    /// Other participants signals go to.
    pub peers: Vec<String>,
    /// Peers that sent DECLINE (outgoing calls only).
    pub declined: HashSet<String>,
    pub tokens: TokenBundle,
    pub version: u32,
    /// A remote party answered or showed up in the media channel.
    pub remote_answered: bool,
    /// The media SDK accepted our join request.
    pub media_requested: bool,
}

impl ActiveCall {
    /// Peers still worth signalling.
    pub fn signal_targets(&self) -> Vec<String> {
        self.peers
            .iter()
            .filter(|p| !self.declined.contains(*p))
            .cloned()
            .collect()
    }

    pub fn all_declined(&self) -> bool {
        !self.peers.is_empty() && self.peers.iter().all(|p| self.declined.contains(p))
    }
}

/// The whole local state owned by the actor.
#[derive(Debug, Clone, Default)]
pub struct LocalCall {
    pub phase: CallPhase,
    pub active: Option<ActiveCall>,
    pub invite: Option<PendingInvite>,
}

/// What an inbound signal means for the local state.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalAction {
    Ignore,
    /// Ring: a new incoming call.
    NewInvite(PendingInvite),
    /// The caller gave up before we answered.
    InviteCancelled,
    /// Another resident answered the call we were offered.
    InviteTaken,
    RemoteAnswered,
    RemoteDeclined { from: String },
    RemoteEnded,
}

/// Decides what `signal` does to `state` for a device acting as `me`.
pub fn classify_signal(
    me: &ClientContext,
    state: &LocalCall,
    signal: &RtmSignal,
    now: DateTime<Utc>,
) -> SignalAction {
    if signal.from == me.user_id {
        return SignalAction::Ignore;
    }

    if let Some(active) = state
        .active
        .as_ref()
        .filter(|a| a.call_id == signal.call_id)
    {
        if !state.phase.is_live() {
            return SignalAction::Ignore;
        }
        return match (signal.signal_type, active.direction) {
            (SignalType::End, _) => SignalAction::RemoteEnded,
            (SignalType::Answer, Direction::Outgoing) => SignalAction::RemoteAnswered,
            (SignalType::Decline, Direction::Outgoing) => SignalAction::RemoteDeclined {
                from: signal.from.clone(),
            },
            _ => SignalAction::Ignore,
        };
    }

    if let Some(invite) = state
        .invite
        .as_ref()
        .filter(|i| i.call_id == signal.call_id)
    {
        return match signal.signal_type {
            SignalType::End => SignalAction::InviteCancelled,
            SignalType::Answer if signal.from != invite.from => SignalAction::InviteTaken,
            _ => SignalAction::Ignore,
        };
    }

    let can_ring = me.user_type == UserType::Resident
        && state.phase.is_available()
        && state.active.is_none()
        && state.invite.is_none();
    if signal.signal_type == SignalType::Invite && can_ring {
        return SignalAction::NewInvite(PendingInvite::from_signal(signal, now));
    }
    SignalAction::Ignore
}

/// Time to wait before renewing credentials that expire at `expires_at`,
/// renewing `lead` early. Zero when renewal is already due.
pub fn renewal_delay(expires_at: DateTime<Utc>, now: DateTime<Utc>, lead: Duration) -> Duration {
    let lead = chrono::Duration::from_std(lead).unwrap_or(chrono::Duration::zero());
    (expires_at - lead - now).to_std().unwrap_or(Duration::ZERO)
}

/// Observable state published to UIs and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientSnapshot {
    pub phase: CallPhase,
    pub call_id: Option<CallId>,
    pub channel_name: Option<String>,
    pub direction: Option<Direction>,
    pub invite: Option<PendingInvite>,
    /// Expiry of the credentials the current call runs on.
    pub token_expires_at: Option<DateTime<Utc>>,
    pub muted: bool,
    pub speaker: bool,
    /// Messaging session connected.
    pub online: bool,
    pub last_error: Option<String>,
}

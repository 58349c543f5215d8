// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events raised by the media and messaging SDK adapters.

use strum::Display;

/// Connection state of the messaging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Session was taken over or refused; a new login is required.
    Aborted,
}

/// One asynchronous outcome reported by an SDK adapter.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SdkEvent {
    /// This device joined a media channel.
    Joined { channel: String, uid: String },
    /// This device left its media channel.
    Left { channel: String },
    /// A remote user joined the current media channel.
    UserJoined { uid: String },
    /// A remote user left or dropped from the current media channel.
    UserOffline { uid: String },
    /// The media token expires soon.
    TokenWillExpire { channel: String },
    /// The media token has expired and a new one is required.
    TokenRequested { channel: String },
    /// Text message from another messaging user.
    PeerMessage { from: String, text: String },
    /// Messaging session state change.
    StatusChanged {
        state: ConnectionState,
        reason: Option<String>,
    },
}

impl SdkEvent {
    /// Convenience constructor for inbound peer messages.
    pub fn peer_message(from: impl Into<String>, text: impl Into<String>) -> Self {
        Self::PeerMessage {
            from: from.into(),
            text: text.into(),
        }
    }

    /// Whether this event comes from the media transport rather than the
    /// messaging one.
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            Self::Joined { .. }
                | Self::Left { .. }
                | Self::UserJoined { .. }
                | Self::UserOffline { .. }
                | Self::TokenWillExpire { .. }
                | Self::TokenRequested { .. }
        )
    }
}

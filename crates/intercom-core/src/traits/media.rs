// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime audio transport collaborator.
//!
//! Implementations report asynchronous outcomes (joined, left, remote user
//! joined/offline, token expiry) on the event bus they were constructed with,
//! not through these method results.

use async_trait::async_trait;

use crate::error::IntercomError;
use crate::traits::adapter::PluginAdapter;

/// Join/leave/publish primitives of the media SDK.
#[async_trait]
pub trait MediaAdapter: PluginAdapter {
    /// Requests to join `channel` as `uid`. Success is confirmed by a
    /// joined event on the bus.
    async fn join_channel(
        &self,
        channel: &str,
        uid: &str,
        token: &str,
    ) -> Result<(), IntercomError>;

    /// Leaves the current channel. Completion is confirmed by a left event.
    async fn leave_channel(&self) -> Result<(), IntercomError>;

    /// Hands a fresh media token to the SDK for the current channel.
    async fn renew_token(&self, token: &str) -> Result<(), IntercomError>;

    /// Mutes or unmutes the local audio stream.
    async fn set_muted(&self, muted: bool) -> Result<(), IntercomError>;

    /// Routes audio to the loudspeaker or the earpiece.
    async fn set_speakerphone(&self, enabled: bool) -> Result<(), IntercomError>;
}

// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime peer-messaging collaborator.

use async_trait::async_trait;

use crate::error::IntercomError;
use crate::traits::adapter::PluginAdapter;

/// Login and peer-to-peer text delivery of the messaging SDK.
///
/// Inbound messages and connection status changes are published on the
/// event bus the adapter was built with.
#[async_trait]
pub trait MessagingAdapter: PluginAdapter {
    /// Logs in as `uid`, replacing any previous session.
    async fn login(&self, uid: &str, token: &str) -> Result<(), IntercomError>;

    /// Ends the current session. Logging out while offline is a no-op.
    async fn logout(&self) -> Result<(), IntercomError>;

    /// Sends one text message to `peer_id`.
    async fn send_peer_message(&self, peer_id: &str, text: &str) -> Result<(), IntercomError>;
}

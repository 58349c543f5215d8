// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory media and messaging SDKs.
//!
//! A [`MockNetwork`] routes peer messages between logged-in
//! [`MockMessaging`] sessions and tracks media channel membership for
//! [`MockMedia`] instances, raising the same bus events a real SDK would.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use intercom_bus::{ConnectionState, SdkEvent, SdkEventBus};
use intercom_core::{
    AdapterType, HealthStatus, IntercomError, MediaAdapter, MessagingAdapter, PluginAdapter,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct NetworkState {
    /// Messaging sessions by uid.
    online: HashMap<String, SdkEventBus>,
    /// Media channel members: channel -> (uid, bus).
    channels: HashMap<String, Vec<(String, SdkEventBus)>>,
    /// Peers whose inbound messages are dropped.
    unreachable: HashSet<String>,
}

/// Shared in-memory transport for any number of mock devices.
#[derive(Default)]
pub struct MockNetwork {
    state: Mutex<NetworkState>,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a device with its own bus, media SDK and messaging SDK.
    pub fn device(self: &Arc<Self>) -> MockDevice {
        let bus = SdkEventBus::new();
        MockDevice {
            media: Arc::new(MockMedia::new(Arc::clone(self), bus.clone())),
            messaging: Arc::new(MockMessaging::new(Arc::clone(self), bus.clone())),
            bus,
        }
    }

    /// Makes messages to `uid` fail as if the peer were unreachable.
    pub fn set_unreachable(&self, uid: &str, unreachable: bool) {
        let mut state = lock(&self.state);
        if unreachable {
            state.unreachable.insert(uid.to_string());
        } else {
            state.unreachable.remove(uid);
        }
    }

    pub fn is_online(&self, uid: &str) -> bool {
        lock(&self.state).online.contains_key(uid)
    }

    /// Uids currently in `channel`.
    pub fn members(&self, channel: &str) -> Vec<String> {
        lock(&self.state)
            .channels
            .get(channel)
            .map(|m| m.iter().map(|(uid, _)| uid.clone()).collect())
            .unwrap_or_default()
    }

    /// Delivers raw `text` to `to` as if `from` had sent it.
    pub fn inject_peer_message(&self, from: &str, to: &str, text: &str) -> bool {
        let bus = lock(&self.state).online.get(to).cloned();
        match bus {
            Some(bus) => {
                bus.publish(&SdkEvent::peer_message(from, text));
                true
            }
            None => false,
        }
    }
}

/// One simulated handset.
pub struct MockDevice {
    pub bus: SdkEventBus,
    pub media: Arc<MockMedia>,
    pub messaging: Arc<MockMessaging>,
}

macro_rules! plugin_adapter {
    ($ty:ty, $name:literal, $kind:expr) => {
        #[async_trait]
        impl PluginAdapter for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn version(&self) -> semver::Version {
                semver::Version::new(0, 1, 0)
            }

            fn adapter_type(&self) -> AdapterType {
                $kind
            }

            async fn health_check(&self) -> Result<HealthStatus, IntercomError> {
                Ok(HealthStatus::Healthy)
            }

            async fn shutdown(&self) -> Result<(), IntercomError> {
                Ok(())
            }
        }
    };
}

#[derive(Default)]
struct MediaState {
    joined: Option<(String, String)>,
    join_tokens: Vec<String>,
    renewed_tokens: Vec<String>,
    muted: bool,
    speaker: bool,
    fail_join: bool,
    fail_renew: bool,
}

/// Mock media SDK. Join and leave outcomes are published on the device bus.
pub struct MockMedia {
    network: Arc<MockNetwork>,
    bus: SdkEventBus,
    state: Mutex<MediaState>,
}

impl MockMedia {
    fn new(network: Arc<MockNetwork>, bus: SdkEventBus) -> Self {
        Self {
            network,
            bus,
            state: Mutex::new(MediaState::default()),
        }
    }

    /// Channel this device is in, if any.
    pub fn current_channel(&self) -> Option<String> {
        lock(&self.state).joined.as_ref().map(|(c, _)| c.clone())
    }

    pub fn join_tokens(&self) -> Vec<String> {
        lock(&self.state).join_tokens.clone()
    }

    pub fn renewed_tokens(&self) -> Vec<String> {
        lock(&self.state).renewed_tokens.clone()
    }

    pub fn is_muted(&self) -> bool {
        lock(&self.state).muted
    }

    pub fn is_speaker_on(&self) -> bool {
        lock(&self.state).speaker
    }

    pub fn fail_next_joins(&self, fail: bool) {
        lock(&self.state).fail_join = fail;
    }

    pub fn fail_renewals(&self, fail: bool) {
        lock(&self.state).fail_renew = fail;
    }

    /// Raises an SDK event on this device's bus.
    pub fn fire(&self, event: SdkEvent) {
        self.bus.publish(&event);
    }

    /// Drops this device from its channel without a local leave, as a
    /// network loss would. Peers see the device go offline.
    pub fn drop_connection(&self) {
        let Some((channel, uid)) = lock(&self.state).joined.take() else {
            return;
        };
        let peers = self.remove_member(&channel, &uid);
        for peer in peers {
            peer.publish(&SdkEvent::UserOffline { uid: uid.clone() });
        }
        self.bus.publish(&SdkEvent::Left { channel });
    }

    fn remove_member(&self, channel: &str, uid: &str) -> Vec<SdkEventBus> {
        let mut net = lock(&self.network.state);
        let Some(members) = net.channels.get_mut(channel) else {
            return Vec::new();
        };
        members.retain(|(member, _)| member != uid);
        let peers = members.iter().map(|(_, bus)| bus.clone()).collect();
        if members.is_empty() {
            net.channels.remove(channel);
        }
        peers
    }
}

plugin_adapter!(MockMedia, "mock-media", AdapterType::Media);

#[async_trait]
impl MediaAdapter for MockMedia {
    async fn join_channel(&self, channel: &str, uid: &str, token: &str) -> Result<(), IntercomError> {
        {
            let mut state = lock(&self.state);
            if state.fail_join {
                return Err(IntercomError::upstream("media join refused"));
            }
            if state.joined.is_some() {
                return Err(IntercomError::invalid_state("already in a media channel"));
            }
            state.joined = Some((channel.to_string(), uid.to_string()));
            state.join_tokens.push(token.to_string());
        }

        let existing = {
            let mut net = lock(&self.network.state);
            let members = net.channels.entry(channel.to_string()).or_default();
            let existing = members.clone();
            members.push((uid.to_string(), self.bus.clone()));
            existing
        };

        self.bus.publish(&SdkEvent::Joined {
            channel: channel.to_string(),
            uid: uid.to_string(),
        });
        for (peer_uid, peer_bus) in existing {
            peer_bus.publish(&SdkEvent::UserJoined {
                uid: uid.to_string(),
            });
            self.bus.publish(&SdkEvent::UserJoined { uid: peer_uid });
        }
        Ok(())
    }

    async fn leave_channel(&self) -> Result<(), IntercomError> {
        let Some((channel, uid)) = lock(&self.state).joined.take() else {
            return Ok(());
        };
        for peer in self.remove_member(&channel, &uid) {
            peer.publish(&SdkEvent::UserOffline { uid: uid.clone() });
        }
        self.bus.publish(&SdkEvent::Left { channel });
        Ok(())
    }

    async fn renew_token(&self, token: &str) -> Result<(), IntercomError> {
        let mut state = lock(&self.state);
        if state.fail_renew {
            return Err(IntercomError::upstream("media token renewal refused"));
        }
        state.renewed_tokens.push(token.to_string());
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> Result<(), IntercomError> {
        lock(&self.state).muted = muted;
        Ok(())
    }

    async fn set_speakerphone(&self, enabled: bool) -> Result<(), IntercomError> {
        lock(&self.state).speaker = enabled;
        Ok(())
    }
}

#[derive(Default)]
struct MessagingState {
    uid: Option<String>,
    logins: Vec<(String, String)>,
    sent: Vec<(String, String)>,
    fail_login: bool,
}

/// Mock messaging SDK routing peer messages through the [`MockNetwork`].
pub struct MockMessaging {
    network: Arc<MockNetwork>,
    bus: SdkEventBus,
    state: Mutex<MessagingState>,
}

impl MockMessaging {
    fn new(network: Arc<MockNetwork>, bus: SdkEventBus) -> Self {
        Self {
            network,
            bus,
            state: Mutex::new(MessagingState::default()),
        }
    }

    /// Uid of the live session, if logged in.
    pub fn session_uid(&self) -> Option<String> {
        lock(&self.state).uid.clone()
    }

    /// Every `(uid, token)` this SDK logged in with, oldest first.
    pub fn logins(&self) -> Vec<(String, String)> {
        lock(&self.state).logins.clone()
    }

    /// Every `(peer, text)` accepted for delivery.
    pub fn sent(&self) -> Vec<(String, String)> {
        lock(&self.state).sent.clone()
    }

    pub fn fail_logins(&self, fail: bool) {
        lock(&self.state).fail_login = fail;
    }
}

plugin_adapter!(MockMessaging, "mock-messaging", AdapterType::Messaging);

#[async_trait]
impl MessagingAdapter for MockMessaging {
    async fn login(&self, uid: &str, token: &str) -> Result<(), IntercomError> {
        let previous = {
            let mut state = lock(&self.state);
            if state.fail_login {
                return Err(IntercomError::upstream("messaging login refused"));
            }
            state.logins.push((uid.to_string(), token.to_string()));
            state.uid.replace(uid.to_string())
        };
        {
            let mut net = lock(&self.network.state);
            if let Some(previous) = previous.filter(|p| p != uid) {
                net.online.remove(&previous);
            }
            net.online.insert(uid.to_string(), self.bus.clone());
        }
        self.bus.publish(&SdkEvent::StatusChanged {
            state: ConnectionState::Connected,
            reason: None,
        });
        Ok(())
    }

    async fn logout(&self) -> Result<(), IntercomError> {
        let Some(uid) = lock(&self.state).uid.take() else {
            return Ok(());
        };
        lock(&self.network.state).online.remove(&uid);
        self.bus.publish(&SdkEvent::StatusChanged {
            state: ConnectionState::Disconnected,
            reason: Some("logout".to_string()),
        });
        Ok(())
    }

    async fn send_peer_message(&self, peer_id: &str, text: &str) -> Result<(), IntercomError> {
        let Some(from) = self.session_uid() else {
            return Err(IntercomError::NetworkTransient {
                message: "not logged in".to_string(),
                source: None,
            });
        };
        let peer_bus = {
            let net = lock(&self.network.state);
            if net.unreachable.contains(peer_id) {
                None
            } else {
                net.online.get(peer_id).cloned()
            }
        };
        let Some(peer_bus) = peer_bus else {
            return Err(IntercomError::NetworkTransient {
                message: format!("peer {peer_id} is offline"),
                source: None,
            });
        };
        lock(&self.state)
            .sent
            .push((peer_id.to_string(), text.to_string()));
        peer_bus.publish(&SdkEvent::peer_message(from, text));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn peer_messages_reach_logged_in_devices_only() {
        let network = MockNetwork::new();
        let alice = network.device();
        let bob = network.device();
        let mut inbox = bob.bus.stream();

        alice.messaging.login("alice", "t").await.unwrap();
        assert!(alice.messaging.send_peer_message("bob", "hi").await.is_err());

        bob.messaging.login("bob", "t").await.unwrap();
        // Bob's own login status event comes first.
        assert!(matches!(
            inbox.recv().await,
            Some(SdkEvent::StatusChanged { .. })
        ));
        alice.messaging.send_peer_message("bob", "hi").await.unwrap();
        assert_eq!(
            inbox.recv().await,
            Some(SdkEvent::peer_message("alice", "hi"))
        );

        network.set_unreachable("bob", true);
        assert!(alice.messaging.send_peer_message("bob", "again").await.is_err());
        assert_eq!(alice.messaging.sent().len(), 1);
    }

    #[tokio::test]
    async fn media_membership_raises_presence_events() {
        let network = MockNetwork::new();
        let caller = network.device();
        let callee = network.device();
        let mut caller_events = caller.bus.stream();

        caller.media.join_channel("call-1", "d1", "tok").await.unwrap();
        callee.media.join_channel("call-1", "r1", "tok").await.unwrap();
        assert_eq!(network.members("call-1"), vec!["d1", "r1"]);

        assert!(matches!(caller_events.recv().await, Some(SdkEvent::Joined { .. })));
        assert_eq!(
            caller_events.recv().await,
            Some(SdkEvent::UserJoined { uid: "r1".into() })
        );

        callee.media.leave_channel().await.unwrap();
        assert_eq!(
            caller_events.recv().await,
            Some(SdkEvent::UserOffline { uid: "r1".into() })
        );
        assert!(callee.media.current_channel().is_none());
        // Leaving twice is a quiet no-op.
        callee.media.leave_channel().await.unwrap();
    }
}

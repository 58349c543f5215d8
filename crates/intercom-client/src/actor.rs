// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The call state machine actor.
//!
//! One task owns the [`LocalCall`] and drains a single mailbox fed by three
//! sources: commands from [`CallClient`] handles, SDK events from the bus, and
//! decoded peer signals. Background timers (token renewal, ringing timeout,
//! invite polling, the `ended -> idle` grace delay) never touch state
//! directly; they post messages back into the mailbox and are cancelled with
//! the call they belong to.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use intercom_bus::{ConnectionState, SdkEvent, SdkEventBus, Subscription};
use intercom_config::ClientConfig;
use intercom_core::api::{
    AnswerRequest, CallTokenRequest, DeclineRequest, EndRequest, StartCallRequest, TokenRequest,
};
use intercom_core::signal::DEFAULT_SCHEMA_VERSION;
use intercom_core::{
    CallApi, CallId, Clock, IntercomError, MediaAdapter, MessagingAdapter, RtmSignal,
    SystemClock, TokenBundle, UserType,
};
use intercom_signaling::{SignalingChannel, normalize_targets};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::{
    ActiveCall, CallPhase, ClientContext, ClientSnapshot, Direction, LocalCall, PendingInvite,
    SignalAction, classify_signal, renewal_delay,
};

/// End cause sent when the user hangs up without giving one.
pub const DEFAULT_END_CAUSE: &str = "hangup";
/// The caller gave up waiting for an answer.
pub const TIMEOUT_CAUSE: &str = "timeout";
/// Fresh credentials could not be obtained or applied mid-call.
pub const RENEWAL_FAILED_CAUSE: &str = "token_renewal_failed";
/// Joining media or messaging failed while setting the call up.
pub const SETUP_FAILED_CAUSE: &str = "setup_failed";
/// The other party vanished from the media channel.
pub const REMOTE_OFFLINE_CAUSE: &str = "remote_offline";
/// This device dropped out of the media channel unexpectedly.
pub const MEDIA_LOST_CAUSE: &str = "media_lost";
pub const SHUTDOWN_CAUSE: &str = "shutdown";
/// Reason sent with DECLINE when the user gives none.
pub const DEFAULT_DECLINE_REASON: &str = "declined";

const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long to wait for the media SDK to confirm a leave.
const LEAVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of answering an incoming call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// This device won the call and is joining media.
    Answered,
    /// Someone else answered first (or the caller hung up); the invite is gone.
    AlreadyTaken,
}

type Reply<T> = oneshot::Sender<Result<T, IntercomError>>;

/// Credentials kept alive by a renewal chain.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RenewalTarget {
    Call { call_id: CallId, uid: String },
    Standby { channel: String, uid: String },
}

enum ClientMessage {
    StartCall {
        apartment_number: String,
        building_id: String,
        reply: Reply<CallId>,
    },
    Answer {
        reply: Reply<AnswerOutcome>,
    },
    Decline {
        reason: Option<String>,
        reply: Reply<()>,
    },
    End {
        cause: Option<String>,
        reply: Reply<()>,
    },
    Recover {
        call_id: CallId,
        reply: Reply<bool>,
    },
    GoOnline {
        reply: Reply<()>,
    },
    GoOffline {
        reply: Reply<()>,
    },
    SetMuted {
        muted: bool,
        reply: Reply<()>,
    },
    SetSpeaker {
        enabled: bool,
        reply: Reply<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },

    Sdk(SdkEvent),
    Signal(RtmSignal),
    Renewed {
        target: RenewalTarget,
        result: Result<TokenBundle, IntercomError>,
    },
    GraceElapsed {
        generation: u64,
    },
    RingingTimeout {
        call_id: CallId,
    },
    LeaveTimeout {
        call_id: CallId,
    },
    InviteStale {
        call_id: CallId,
    },
}

/// Everything a state machine instance is built from.
pub struct ClientDeps {
    pub context: ClientContext,
    pub config: ClientConfig,
    pub api: Arc<dyn CallApi>,
    pub media: Arc<dyn MediaAdapter>,
    pub messaging: Arc<dyn MessagingAdapter>,
    /// Bus the media and messaging adapters publish on.
    pub bus: SdkEventBus,
    pub clock: Arc<dyn Clock>,
}

impl ClientDeps {
    pub fn new(
        context: ClientContext,
        config: ClientConfig,
        api: Arc<dyn CallApi>,
        media: Arc<dyn MediaAdapter>,
        messaging: Arc<dyn MessagingAdapter>,
        bus: SdkEventBus,
    ) -> Self {
        Self {
            context,
            config,
            api,
            media,
            messaging,
            bus,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Handle to a running call state machine.
///
/// Cheap to clone. The actor stops on [`CallClient::shutdown`] or once every
/// handle is dropped.
#[derive(Clone)]
pub struct CallClient {
    tx: mpsc::UnboundedSender<ClientMessage>,
    state: watch::Receiver<ClientSnapshot>,
}

fn stopped() -> IntercomError {
    IntercomError::Internal("call client is not running".to_string())
}

impl CallClient {
    /// Spawns the actor on the current tokio runtime and subscribes it to
    /// the bus.
    pub fn spawn(deps: ClientDeps) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ClientSnapshot::default());
        let signaling = SignalingChannel::new(deps.messaging, deps.bus.clone());

        let mailbox = tx.downgrade();
        let sdk_sub = deps.bus.subscribe(move |event: &SdkEvent| {
            if matches!(event, SdkEvent::PeerMessage { .. }) {
                return;
            }
            if let Some(tx) = mailbox.upgrade() {
                let _ = tx.send(ClientMessage::Sdk(event.clone()));
            }
        });
        let mailbox = tx.downgrade();
        let signal_sub = signaling.on_signal(move |signal| {
            if let Some(tx) = mailbox.upgrade() {
                let _ = tx.send(ClientMessage::Signal(signal));
            }
        });

        let actor = CallActor {
            me: deps.context,
            config: deps.config,
            api: deps.api,
            media: deps.media,
            signaling,
            clock: deps.clock,
            mailbox: tx.downgrade(),
            state_tx,
            local: LocalCall::default(),
            ended_call: None,
            standby: None,
            muted: false,
            speaker: false,
            online: false,
            last_error: None,
            call_tasks: CancellationToken::new(),
            renewal: CancellationToken::new(),
            teardown_tasks: CancellationToken::new(),
            invite_tasks: CancellationToken::new(),
            standby_tasks: CancellationToken::new(),
            grace: CancellationToken::new(),
            grace_generation: 0,
            subscriptions: vec![sdk_sub, signal_sub],
        };
        let handle = tokio::spawn(actor.run(rx));
        (Self { tx, state: state_rx }, handle)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> ClientMessage,
    ) -> Result<T, IntercomError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())?
    }

    /// Places a call to an apartment. Only a doorman may call.
    pub async fn start_call(
        &self,
        apartment_number: &str,
        building_id: &str,
    ) -> Result<CallId, IntercomError> {
        let apartment_number = apartment_number.to_string();
        let building_id = building_id.to_string();
        self.request(|reply| ClientMessage::StartCall {
            apartment_number,
            building_id,
            reply,
        })
        .await
    }

    /// Answers the pending invite.
    pub async fn answer(&self) -> Result<AnswerOutcome, IntercomError> {
        self.request(|reply| ClientMessage::Answer { reply }).await
    }

    /// Declines the pending invite.
    pub async fn decline(&self, reason: Option<&str>) -> Result<(), IntercomError> {
        let reason = reason.map(str::to_string);
        self.request(|reply| ClientMessage::Decline { reason, reply })
            .await
    }

    /// Hangs up the active call. Calling it while already ending is a no-op.
    pub async fn end_call(&self, cause: Option<&str>) -> Result<(), IntercomError> {
        let cause = cause.map(str::to_string);
        self.request(|reply| ClientMessage::End { cause, reply }).await
    }

    /// Looks a call up over REST and rings for it if this user is still
    /// being offered it. Returns whether an invite is now pending.
    pub async fn recover_call(&self, call_id: &CallId) -> Result<bool, IntercomError> {
        let call_id = call_id.clone();
        self.request(|reply| ClientMessage::Recover { call_id, reply })
            .await
    }

    /// Logs into messaging on the standby channel so invites can arrive.
    pub async fn go_online(&self) -> Result<(), IntercomError> {
        self.request(|reply| ClientMessage::GoOnline { reply }).await
    }

    pub async fn go_offline(&self) -> Result<(), IntercomError> {
        self.request(|reply| ClientMessage::GoOffline { reply }).await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), IntercomError> {
        self.request(|reply| ClientMessage::SetMuted { muted, reply })
            .await
    }

    pub async fn set_speakerphone(&self, enabled: bool) -> Result<(), IntercomError> {
        self.request(|reply| ClientMessage::SetSpeaker { enabled, reply })
            .await
    }

    /// Hangs up any live call, logs out and stops the actor.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(ClientMessage::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Latest published state.
    pub fn snapshot(&self) -> ClientSnapshot {
        self.state.borrow().clone()
    }

    /// A receiver that sees every state change.
    pub fn watch(&self) -> watch::Receiver<ClientSnapshot> {
        self.state.clone()
    }

    /// Waits until the state satisfies `predicate`.
    pub async fn wait_for(
        &self,
        timeout: Duration,
        mut predicate: impl FnMut(&ClientSnapshot) -> bool,
    ) -> Result<ClientSnapshot, IntercomError> {
        let mut rx = self.state.clone();
        match tokio::time::timeout(timeout, rx.wait_for(|s| predicate(s))).await {
            Ok(Ok(snapshot)) => Ok(snapshot.clone()),
            Ok(Err(_)) => Err(stopped()),
            Err(_) => Err(IntercomError::Timeout { duration: timeout }),
        }
    }

    /// Waits until the phase equals `phase`.
    pub async fn wait_for_phase(
        &self,
        phase: CallPhase,
        timeout: Duration,
    ) -> Result<ClientSnapshot, IntercomError> {
        self.wait_for(timeout, |s| s.phase == phase).await
    }
}

async fn fetch_bundle(
    api: &dyn CallApi,
    target: &RenewalTarget,
) -> Result<TokenBundle, IntercomError> {
    match target {
        RenewalTarget::Call { call_id, uid } => {
            api.token_for_call(&CallTokenRequest::new(call_id, uid))
                .await
        }
        RenewalTarget::Standby { channel, uid } => {
            api.generate_token(&TokenRequest {
                channel_name: channel.clone(),
                uid: uid.clone(),
                ..Default::default()
            })
            .await
        }
    }
}

struct CallActor {
    me: ClientContext,
    config: ClientConfig,
    api: Arc<dyn CallApi>,
    media: Arc<dyn MediaAdapter>,
    signaling: SignalingChannel,
    clock: Arc<dyn Clock>,
    mailbox: mpsc::WeakUnboundedSender<ClientMessage>,
    state_tx: watch::Sender<ClientSnapshot>,

    local: LocalCall,
    /// Call shown while in `ended`.
    ended_call: Option<CallId>,
    /// Standby messaging credentials while online.
    standby: Option<TokenBundle>,
    muted: bool,
    speaker: bool,
    online: bool,
    last_error: Option<String>,

    /// Timers owned by the active call.
    call_tasks: CancellationToken,
    /// Current renewal chain of the active call (child of `call_tasks`).
    renewal: CancellationToken,
    teardown_tasks: CancellationToken,
    invite_tasks: CancellationToken,
    standby_tasks: CancellationToken,
    grace: CancellationToken,
    grace_generation: u64,
    subscriptions: Vec<Subscription>,
}

impl CallActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ClientMessage>) {
        debug!(user_id = %self.me.user_id, user_type = %self.me.user_type, "call client started");
        loop {
            match rx.recv().await {
                Some(ClientMessage::Shutdown { reply }) => {
                    self.shutdown().await;
                    self.publish();
                    let _ = reply.send(());
                    return;
                }
                Some(message) => {
                    self.handle(message).await;
                    self.publish();
                }
                None => {
                    self.shutdown().await;
                    return;
                }
            }
        }
    }

    async fn handle(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::StartCall {
                apartment_number,
                building_id,
                reply,
            } => {
                let result = self.start_call(apartment_number, building_id).await;
                let _ = reply.send(result);
            }
            ClientMessage::Answer { reply } => {
                let result = self.answer().await;
                let _ = reply.send(result);
            }
            ClientMessage::Decline { reason, reply } => {
                let result = self.decline(reason).await;
                let _ = reply.send(result);
            }
            ClientMessage::End { cause, reply } => {
                let result = self.end_call(cause).await;
                let _ = reply.send(result);
            }
            ClientMessage::Recover { call_id, reply } => {
                let result = self.recover_call(call_id).await;
                let _ = reply.send(result);
            }
            ClientMessage::GoOnline { reply } => {
                let result = self.go_online().await;
                let _ = reply.send(result);
            }
            ClientMessage::GoOffline { reply } => {
                self.go_offline().await;
                let _ = reply.send(Ok(()));
            }
            ClientMessage::SetMuted { muted, reply } => {
                let result = self.media.set_muted(muted).await;
                if result.is_ok() {
                    self.muted = muted;
                }
                let _ = reply.send(result);
            }
            ClientMessage::SetSpeaker { enabled, reply } => {
                let result = self.media.set_speakerphone(enabled).await;
                if result.is_ok() {
                    self.speaker = enabled;
                }
                let _ = reply.send(result);
            }
            ClientMessage::Shutdown { reply } => {
                let _ = reply.send(());
            }
            ClientMessage::Sdk(event) => self.on_sdk_event(event).await,
            ClientMessage::Signal(signal) => self.on_signal(signal).await,
            ClientMessage::Renewed { target, result } => self.on_renewed(target, result).await,
            ClientMessage::GraceElapsed { generation } => self.on_grace_elapsed(generation),
            ClientMessage::RingingTimeout { call_id } => self.on_ringing_timeout(call_id).await,
            ClientMessage::LeaveTimeout { call_id } => self.on_leave_timeout(call_id).await,
            ClientMessage::InviteStale { call_id } => self.on_invite_stale(call_id),
        }
    }

    // --- State publication ---

    fn snapshot(&self) -> ClientSnapshot {
        let active = self.local.active.as_ref();
        let invite = self.local.invite.as_ref();
        ClientSnapshot {
            phase: self.local.phase,
            call_id: active
                .map(|a| a.call_id.clone())
                .or_else(|| invite.map(|i| i.call_id.clone()))
                .or_else(|| self.ended_call.clone()),
            channel_name: active
                .map(|a| a.channel_name.clone())
                .or_else(|| invite.map(|i| i.channel_name.clone())),
            direction: active
                .map(|a| a.direction)
                .or_else(|| invite.map(|_| Direction::Incoming)),
            invite: self.local.invite.clone(),
            token_expires_at: active.map(|a| a.tokens.expires_at),
            muted: self.muted,
            speaker: self.speaker,
            online: self.online,
            last_error: self.last_error.clone(),
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.state_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    fn set_phase(&mut self, next: CallPhase) {
        let previous = self.local.phase;
        if previous == next {
            return;
        }
        self.local.phase = next;
        debug!(user_id = %self.me.user_id, from = %previous, to = %next, "call phase");
        self.publish();
    }

    // --- Timers ---

    fn post_after(&self, delay: Duration, cancel: CancellationToken, message: ClientMessage) {
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(tx) = mailbox.upgrade() {
                        let _ = tx.send(message);
                    }
                }
            }
        });
    }

    fn spawn_renewal(&self, target: RenewalTarget, delay: Duration, cancel: CancellationToken) {
        let api = Arc::clone(&self.api);
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            // Once started, the fetch runs to completion; the actor drops
            // results for calls that are gone.
            let result = fetch_bundle(api.as_ref(), &target).await;
            if let Some(tx) = mailbox.upgrade() {
                let _ = tx.send(ClientMessage::Renewed { target, result });
            }
        });
    }

    fn schedule_renewal(
        &self,
        target: RenewalTarget,
        expires_at: chrono::DateTime<chrono::Utc>,
        cancel: CancellationToken,
    ) {
        let lead = Duration::from_secs(self.config.renewal_lead_secs);
        let delay = renewal_delay(expires_at, self.clock.now(), lead);
        debug!(?target, delay_ms = delay.as_millis() as u64, "token renewal scheduled");
        self.spawn_renewal(target, delay, cancel);
    }

    /// Replaces the active call's renewal chain with one aimed at
    /// `expires_at`.
    fn restart_call_renewal(&mut self, call_id: &CallId, expires_at: chrono::DateTime<chrono::Utc>) {
        self.renewal.cancel();
        self.renewal = self.call_tasks.child_token();
        let target = RenewalTarget::Call {
            call_id: call_id.clone(),
            uid: self.me.user_id.clone(),
        };
        self.schedule_renewal(target, expires_at, self.renewal.clone());
    }

    fn schedule_grace(&mut self) {
        self.cancel_grace();
        self.grace = CancellationToken::new();
        let delay = Duration::from_millis(self.config.idle_grace_ms);
        let generation = self.grace_generation;
        self.post_after(
            delay,
            self.grace.clone(),
            ClientMessage::GraceElapsed { generation },
        );
    }

    fn cancel_grace(&mut self) {
        self.grace.cancel();
        self.grace_generation += 1;
    }

    fn watch_invite(&mut self, call_id: CallId) {
        self.invite_tasks.cancel();
        self.invite_tasks = CancellationToken::new();
        if self.config.invite_poll_interval_ms == 0 {
            return;
        }

        let api = Arc::clone(&self.api);
        let mailbox = self.mailbox.clone();
        let cancel = self.invite_tasks.clone();
        let uid = self.me.user_id.clone();
        let period = Duration::from_millis(self.config.invite_poll_interval_ms);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // Skip the immediate first tick.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let still_pending = match api.call_status(&call_id).await {
                            Ok(snapshot) => {
                                snapshot.call.status.is_ringing()
                                    && snapshot
                                        .participant(&uid)
                                        .is_some_and(|p| p.status.is_pending())
                            }
                            Err(e) if e.is_rejection() => false,
                            Err(e) if e.is_retryable() => {
                                debug!(call_id = %call_id, error = %e, "invite status poll will retry");
                                true
                            }
                            Err(e) => {
                                warn!(call_id = %call_id, error = %e, "invite status poll failed (non-fatal)");
                                true
                            }
                        };
                        if !still_pending {
                            if let Some(tx) = mailbox.upgrade() {
                                let _ = tx.send(ClientMessage::InviteStale {
                                    call_id: call_id.clone(),
                                });
                            }
                            break;
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        });
    }

    // --- Server and messaging helpers ---

    async fn end_on_server(&self, call_id: &CallId, cause: &str) {
        let request = EndRequest {
            user_id: self.me.user_id.clone(),
            user_type: self.me.user_type.to_string(),
            cause: Some(cause.to_string()),
        };
        match self.api.end_call(call_id, &request).await {
            Ok(ended) => debug!(
                call_id = %call_id,
                changed = ended.changed,
                duration = ended.duration,
                "call ended on server"
            ),
            Err(e) => warn!(call_id = %call_id, error = %e, "server end failed (non-fatal)"),
        }
    }

    /// Puts messaging back the way it is between calls.
    async fn restore_messaging(&self) {
        match &self.standby {
            Some(standby) => {
                if let Err(e) = self.signaling.login(&standby.uid, &standby.rtm_token).await {
                    warn!(error = %e, "standby re-login failed (non-fatal)");
                }
            }
            None => self.signaling.logout().await,
        }
    }

    /// Logs into messaging and asks to join the media channel.
    async fn connect(&mut self, tokens: &TokenBundle) -> Result<(), IntercomError> {
        self.signaling.login(&tokens.uid, &tokens.rtm_token).await?;
        self.media
            .join_channel(&tokens.channel_name, &tokens.uid, &tokens.rtc_token)
            .await?;
        if let Some(active) = self.local.active.as_mut() {
            active.media_requested = true;
        }
        Ok(())
    }

    fn ring(&mut self, invite: PendingInvite) {
        self.cancel_grace();
        self.ended_call = None;
        self.last_error = None;
        info!(
            user_id = %self.me.user_id,
            call_id = %invite.call_id,
            from = %invite.from,
            "incoming call"
        );
        let call_id = invite.call_id.clone();
        self.local.invite = Some(invite);
        self.set_phase(CallPhase::Ringing);
        self.watch_invite(call_id);
    }

    fn clear_invite(&mut self) -> Option<PendingInvite> {
        self.invite_tasks.cancel();
        self.local.invite.take()
    }

    // --- Commands ---

    async fn start_call(
        &mut self,
        apartment_number: String,
        building_id: String,
    ) -> Result<CallId, IntercomError> {
        if self.me.user_type != UserType::Doorman {
            return Err(IntercomError::invalid_state(
                "only a doorman can start a call",
            ));
        }
        if !self.local.phase.is_available() || self.local.active.is_some() {
            return Err(IntercomError::invalid_state(format!(
                "cannot start a call while {}",
                self.local.phase
            )));
        }

        self.cancel_grace();
        self.ended_call = None;
        self.last_error = None;
        self.set_phase(CallPhase::Dialing);

        let request = StartCallRequest {
            apartment_number,
            building_id,
            doorman_id: Some(self.me.user_id.clone()),
            client_version: Some(CLIENT_VERSION.to_string()),
            ..Default::default()
        };
        let started = match self.api.start_call(&request).await {
            Ok(started) => started,
            Err(e) => {
                warn!(apartment = %request.apartment_number, error = %e, "start call failed");
                self.last_error = Some(e.to_string());
                self.set_phase(CallPhase::Idle);
                return Err(e);
            }
        };

        let call_id = started.call.id.clone();
        let tokens = started.tokens.initiator.clone();
        self.call_tasks = CancellationToken::new();
        self.local.active = Some(ActiveCall {
            call_id: call_id.clone(),
            channel_name: started.call.channel_name.clone(),
            direction: Direction::Outgoing,
            peers: started.signaling.targets.clone(),
            declined: HashSet::new(),
            tokens: tokens.clone(),
            version: started.signaling.invite.version,
            remote_answered: false,
            media_requested: false,
        });

        if let Err(e) = self.connect(&tokens).await {
            self.roll_back_start(&call_id, &e).await;
            return Err(e);
        }

        let report = self
            .signaling
            .send(&started.signaling.targets, &started.signaling.invite)
            .await;
        if report.all_failed() {
            warn!(call_id = %call_id, "invite reached no resident (non-fatal)");
        }

        self.set_phase(CallPhase::Ringing);
        self.restart_call_renewal(&call_id, tokens.expires_at);
        if self.config.ringing_timeout_secs > 0 {
            self.post_after(
                Duration::from_secs(self.config.ringing_timeout_secs),
                self.call_tasks.clone(),
                ClientMessage::RingingTimeout {
                    call_id: call_id.clone(),
                },
            );
        }
        info!(
            call_id = %call_id,
            targets = started.signaling.targets.len(),
            delivered = report.delivered.len(),
            "outgoing call ringing"
        );
        Ok(call_id)
    }

    async fn roll_back_start(&mut self, call_id: &CallId, error: &IntercomError) {
        warn!(call_id = %call_id, error = %error, "call setup failed, rolling back");
        self.call_tasks.cancel();
        self.end_on_server(call_id, SETUP_FAILED_CAUSE).await;
        if let Some(active) = self.local.active.take() {
            if active.media_requested {
                if let Err(e) = self.media.leave_channel().await {
                    warn!(call_id = %call_id, error = %e, "media leave failed (non-fatal)");
                }
            }
        }
        self.restore_messaging().await;
        self.last_error = Some(error.to_string());
        self.set_phase(CallPhase::Idle);
    }

    async fn answer(&mut self) -> Result<AnswerOutcome, IntercomError> {
        if self.me.user_type != UserType::Resident {
            return Err(IntercomError::invalid_state(
                "only a resident can answer a call",
            ));
        }
        let Some(invite) = self.local.invite.clone() else {
            return Err(IntercomError::invalid_state("no pending invite"));
        };

        self.invite_tasks.cancel();
        let request = AnswerRequest {
            user_id: self.me.user_id.clone(),
            user_type: self.me.user_type.to_string(),
        };
        let answered = match self.api.answer_call(&invite.call_id, &request).await {
            Ok(answered) => answered,
            Err(e) if e.is_race_lost() => {
                info!(call_id = %invite.call_id, "call already taken");
                self.clear_invite();
                self.set_phase(CallPhase::Idle);
                return Ok(AnswerOutcome::AlreadyTaken);
            }
            Err(e) if e.is_rejection() => {
                warn!(call_id = %invite.call_id, error = %e, "answer rejected");
                self.clear_invite();
                self.set_phase(CallPhase::Idle);
                return Err(e);
            }
            Err(e) => {
                warn!(call_id = %invite.call_id, error = %e, "answer failed, invite kept");
                self.watch_invite(invite.call_id.clone());
                return Err(e);
            }
        };
        self.clear_invite();
        self.call_tasks = CancellationToken::new();

        let call_id = invite.call_id.clone();
        let tokens = match answered.tokens {
            Some(tokens) => tokens,
            None => match self
                .api
                .token_for_call(&CallTokenRequest::new(&call_id, &self.me.user_id))
                .await
            {
                Ok(tokens) => tokens,
                Err(e) => {
                    warn!(call_id = %call_id, error = %e, "no credentials for answered call");
                    self.last_error = Some(e.to_string());
                    self.end_on_server(&call_id, SETUP_FAILED_CAUSE).await;
                    let end =
                        RtmSignal::end(&call_id, &self.me.user_id, SETUP_FAILED_CAUSE, invite.version);
                    self.signaling.send(&[invite.from.clone()], &end).await;
                    self.enter_ended(call_id);
                    return Err(e);
                }
            },
        };

        let peers = normalize_targets(
            answered.participants.iter().map(|p| p.user_id.as_str()),
            Some(self.me.user_id.as_str()),
        );
        self.local.active = Some(ActiveCall {
            call_id: call_id.clone(),
            channel_name: answered.call.channel_name.clone(),
            direction: Direction::Incoming,
            peers: peers.clone(),
            declined: HashSet::new(),
            tokens: tokens.clone(),
            version: invite.version,
            remote_answered: true,
            media_requested: false,
        });
        self.set_phase(CallPhase::Connecting);

        if let Err(e) = self.connect(&tokens).await {
            warn!(call_id = %call_id, error = %e, "could not join answered call");
            self.last_error = Some(e.to_string());
            self.hang_up(SETUP_FAILED_CAUSE).await;
            return Err(e);
        }

        let answer = RtmSignal::answer(&call_id, &self.me.user_id, invite.version);
        self.signaling.send(&peers, &answer).await;
        self.restart_call_renewal(&call_id, tokens.expires_at);
        info!(call_id = %call_id, "answered incoming call");
        Ok(AnswerOutcome::Answered)
    }

    async fn decline(&mut self, reason: Option<String>) -> Result<(), IntercomError> {
        let Some(invite) = self.local.invite.clone() else {
            return Err(IntercomError::invalid_state("no pending invite"));
        };
        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DECLINE_REASON.to_string());
        let request = DeclineRequest {
            user_id: self.me.user_id.clone(),
            user_type: self.me.user_type.to_string(),
            reason: Some(reason.clone()),
        };

        match self.api.decline_call(&invite.call_id, &request).await {
            Ok(declined) => debug!(
                call_id = %invite.call_id,
                all_declined = declined.all_declined,
                "decline recorded"
            ),
            Err(e) if e.is_rejection() => {
                warn!(call_id = %invite.call_id, error = %e, "decline rejected, dropping invite");
                self.clear_invite();
                self.set_phase(CallPhase::Idle);
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        self.clear_invite();
        let signal = RtmSignal::decline(&invite.call_id, &self.me.user_id, &reason, invite.version);
        self.signaling.send(&[invite.from.clone()], &signal).await;
        self.set_phase(CallPhase::Idle);
        info!(call_id = %invite.call_id, reason = %reason, "declined incoming call");
        Ok(())
    }

    async fn end_call(&mut self, cause: Option<String>) -> Result<(), IntercomError> {
        if matches!(self.local.phase, CallPhase::Ending | CallPhase::Ended) {
            return Ok(());
        }
        if self.local.active.is_none() {
            return Err(IntercomError::invalid_state("no active call"));
        }
        let cause = cause
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_END_CAUSE.to_string());
        self.hang_up(&cause).await;
        Ok(())
    }

    async fn recover_call(&mut self, call_id: CallId) -> Result<bool, IntercomError> {
        if self.me.user_type != UserType::Resident {
            return Err(IntercomError::invalid_state(
                "only a resident can recover an incoming call",
            ));
        }
        if let Some(invite) = &self.local.invite {
            return Ok(invite.call_id == call_id);
        }
        if !self.local.phase.is_available() || self.local.active.is_some() {
            return Err(IntercomError::invalid_state(format!(
                "cannot recover a call while {}",
                self.local.phase
            )));
        }

        let snapshot = self.api.call_status(&call_id).await?;
        let pending = snapshot.call.status.is_ringing()
            && snapshot
                .participant(&self.me.user_id)
                .is_some_and(|p| p.status.is_pending());
        if !pending {
            debug!(call_id = %call_id, status = %snapshot.call.status, "nothing to recover");
            return Ok(false);
        }

        self.ring(PendingInvite {
            call_id,
            from: snapshot.call.doorman_id.clone(),
            channel_name: snapshot.call.channel_name.clone(),
            version: DEFAULT_SCHEMA_VERSION,
            received_at: self.clock.now(),
        });
        Ok(true)
    }

    async fn go_online(&mut self) -> Result<(), IntercomError> {
        let target = RenewalTarget::Standby {
            channel: self.me.standby_channel(),
            uid: self.me.user_id.clone(),
        };
        let bundle = fetch_bundle(self.api.as_ref(), &target).await?;
        if self.local.active.is_none() {
            self.signaling.login(&bundle.uid, &bundle.rtm_token).await?;
        }
        self.standby_tasks.cancel();
        self.standby_tasks = CancellationToken::new();
        self.schedule_renewal(target, bundle.expires_at, self.standby_tasks.clone());
        self.standby = Some(bundle);
        info!(user_id = %self.me.user_id, "standing by for calls");
        Ok(())
    }

    async fn go_offline(&mut self) {
        self.standby_tasks.cancel();
        self.standby = None;
        if self.local.active.is_none() {
            self.signaling.logout().await;
        }
        if self.clear_invite().is_some() {
            self.set_phase(CallPhase::Idle);
        }
        info!(user_id = %self.me.user_id, "left standby");
    }

    async fn shutdown(&mut self) {
        if self.local.phase.is_live() && self.local.active.is_some() {
            self.hang_up(SHUTDOWN_CAUSE).await;
        }
        if self.local.phase == CallPhase::Ending {
            self.finish_ended().await;
        }
        self.clear_invite();
        for token in [
            &self.call_tasks,
            &self.teardown_tasks,
            &self.standby_tasks,
            &self.grace,
        ] {
            token.cancel();
        }
        self.standby = None;
        self.signaling.logout().await;
        self.subscriptions.clear();
        info!(user_id = %self.me.user_id, "call client stopped");
    }

    // --- Teardown ---

    /// Ends the active call everywhere: server, peers, then local media.
    async fn hang_up(&mut self, cause: &str) {
        let Some(active) = self.local.active.clone() else {
            return;
        };
        if !self.local.phase.is_live() {
            return;
        }
        self.end_on_server(&active.call_id, cause).await;
        let end = RtmSignal::end(&active.call_id, &self.me.user_id, cause, active.version);
        self.signaling.send(&active.signal_targets(), &end).await;
        info!(call_id = %active.call_id, cause = %cause, "hung up");
        self.teardown().await;
    }

    /// Leaves media for the active call. `ended` follows once the SDK
    /// confirms the leave.
    async fn teardown(&mut self) {
        let Some(active) = self.local.active.as_ref() else {
            return;
        };
        if !self.local.phase.is_live() {
            return;
        }
        let call_id = active.call_id.clone();
        let media_requested = active.media_requested;
        self.set_phase(CallPhase::Ending);
        self.call_tasks.cancel();

        if media_requested {
            match self.media.leave_channel().await {
                Ok(()) => {
                    self.teardown_tasks = CancellationToken::new();
                    self.post_after(
                        LEAVE_TIMEOUT,
                        self.teardown_tasks.clone(),
                        ClientMessage::LeaveTimeout { call_id },
                    );
                    return;
                }
                Err(e) => warn!(call_id = %call_id, error = %e, "media leave failed (non-fatal)"),
            }
        }
        self.finish_ended().await;
    }

    async fn finish_ended(&mut self) {
        self.teardown_tasks.cancel();
        self.call_tasks.cancel();
        let Some(active) = self.local.active.take() else {
            return;
        };
        self.restore_messaging().await;
        info!(call_id = %active.call_id, "call ended");
        self.enter_ended(active.call_id);
    }

    fn enter_ended(&mut self, call_id: CallId) {
        self.ended_call = Some(call_id);
        self.set_phase(CallPhase::Ended);
        self.schedule_grace();
    }

    // --- Inbound events ---

    async fn on_signal(&mut self, signal: RtmSignal) {
        let action = classify_signal(&self.me, &self.local, &signal, self.clock.now());
        debug!(
            user_id = %self.me.user_id,
            call_id = %signal.call_id,
            kind = %signal.signal_type,
            from = %signal.from,
            ?action,
            "signal received"
        );
        match action {
            SignalAction::Ignore => {}
            SignalAction::NewInvite(invite) => self.ring(invite),
            SignalAction::InviteCancelled => {
                if let Some(invite) = self.clear_invite() {
                    info!(call_id = %invite.call_id, "caller cancelled");
                    self.enter_ended(invite.call_id);
                }
            }
            SignalAction::InviteTaken => {
                if let Some(invite) = self.clear_invite() {
                    info!(call_id = %invite.call_id, by = %signal.from, "answered elsewhere");
                    self.set_phase(CallPhase::Idle);
                }
            }
            SignalAction::RemoteAnswered => self.mark_remote_answered(),
            SignalAction::RemoteDeclined { from } => {
                let all_declined = match self.local.active.as_mut() {
                    Some(active) => {
                        active.declined.insert(from);
                        active.all_declined()
                    }
                    None => false,
                };
                if all_declined {
                    info!(call_id = %signal.call_id, "every resident declined");
                    self.teardown().await;
                }
            }
            SignalAction::RemoteEnded => {
                info!(
                    call_id = %signal.call_id,
                    cause = signal.cause.as_deref().unwrap_or(""),
                    "remote party ended the call"
                );
                self.teardown().await;
            }
        }
    }

    fn mark_remote_answered(&mut self) {
        let phase = self.local.phase;
        let Some(active) = self.local.active.as_mut() else {
            return;
        };
        if !phase.is_live() {
            return;
        }
        active.remote_answered = true;
        if phase == CallPhase::Connecting {
            self.set_phase(CallPhase::Connected);
        }
    }

    async fn on_sdk_event(&mut self, event: SdkEvent) {
        match event {
            SdkEvent::Joined { channel, .. } => {
                let Some(active) = self
                    .local
                    .active
                    .as_ref()
                    .filter(|a| a.channel_name == channel)
                else {
                    return;
                };
                let next = match (active.direction, self.local.phase) {
                    (Direction::Outgoing, CallPhase::Ringing) if active.remote_answered => {
                        CallPhase::Connected
                    }
                    (Direction::Outgoing, CallPhase::Ringing) => CallPhase::Connecting,
                    (Direction::Incoming, CallPhase::Connecting) => CallPhase::Connected,
                    _ => return,
                };
                self.set_phase(next);
            }
            SdkEvent::UserJoined { uid } => {
                if uid != self.me.user_id {
                    self.mark_remote_answered();
                }
            }
            SdkEvent::UserOffline { uid } => {
                let Some((call_id, direction, remote_answered)) = self
                    .local
                    .active
                    .as_ref()
                    .map(|a| (a.call_id.clone(), a.direction, a.remote_answered))
                else {
                    return;
                };
                if uid == self.me.user_id || !self.local.phase.is_live() {
                    return;
                }
                let answered_leg = matches!(
                    self.local.phase,
                    CallPhase::Connecting | CallPhase::Connected
                ) && remote_answered;
                match direction {
                    Direction::Outgoing if !answered_leg => {
                        debug!(call_id = %call_id, uid = %uid, "callee went offline, still waiting");
                    }
                    _ => {
                        info!(call_id = %call_id, uid = %uid, "remote party went offline");
                        self.hang_up(REMOTE_OFFLINE_CAUSE).await;
                    }
                }
            }
            SdkEvent::Left { channel } => {
                let Some(active) = self
                    .local
                    .active
                    .clone()
                    .filter(|a| a.channel_name == channel)
                else {
                    return;
                };
                if self.local.phase.is_live() {
                    warn!(call_id = %active.call_id, "media channel lost");
                    self.call_tasks.cancel();
                    self.end_on_server(&active.call_id, MEDIA_LOST_CAUSE).await;
                    let end = RtmSignal::end(
                        &active.call_id,
                        &self.me.user_id,
                        MEDIA_LOST_CAUSE,
                        active.version,
                    );
                    self.signaling.send(&active.signal_targets(), &end).await;
                }
                self.finish_ended().await;
            }
            SdkEvent::TokenWillExpire { .. } | SdkEvent::TokenRequested { .. } => {
                let Some(active) = self.local.active.as_ref() else {
                    return;
                };
                if self.local.phase.is_live() {
                    debug!(call_id = %active.call_id, "media asked for a fresh token");
                    let target = RenewalTarget::Call {
                        call_id: active.call_id.clone(),
                        uid: self.me.user_id.clone(),
                    };
                    self.spawn_renewal(target, Duration::ZERO, self.call_tasks.clone());
                }
            }
            SdkEvent::StatusChanged { state, .. } => {
                self.online = state == ConnectionState::Connected;
            }
            SdkEvent::PeerMessage { .. } => {}
        }
    }

    async fn on_renewed(
        &mut self,
        target: RenewalTarget,
        result: Result<TokenBundle, IntercomError>,
    ) {
        match target {
            RenewalTarget::Call { call_id, .. } => {
                let current = self.local.phase.is_live()
                    && self
                        .local
                        .active
                        .as_ref()
                        .is_some_and(|a| a.call_id == call_id);
                if !current {
                    debug!(call_id = %call_id, "dropping renewal for a finished call");
                    return;
                }
                let applied = match result {
                    Ok(bundle) => self.apply_call_tokens(&call_id, bundle).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = applied {
                    warn!(call_id = %call_id, error = %e, "token renewal failed, ending call");
                    self.last_error = Some(format!("token renewal failed: {e}"));
                    self.hang_up(RENEWAL_FAILED_CAUSE).await;
                }
            }
            target @ RenewalTarget::Standby { .. } => {
                if self.standby.is_none() {
                    return;
                }
                match result {
                    Ok(bundle) => {
                        if self.local.active.is_none() {
                            if let Err(e) =
                                self.signaling.login(&bundle.uid, &bundle.rtm_token).await
                            {
                                warn!(error = %e, "standby re-login failed (non-fatal)");
                            }
                        }
                        self.schedule_renewal(
                            target,
                            bundle.expires_at,
                            self.standby_tasks.clone(),
                        );
                        self.standby = Some(bundle);
                        debug!(user_id = %self.me.user_id, "standby token renewed");
                    }
                    Err(e) => {
                        warn!(error = %e, "standby token renewal failed");
                        self.last_error = Some(format!("standby renewal failed: {e}"));
                        self.standby = None;
                    }
                }
            }
        }
    }

    async fn apply_call_tokens(
        &mut self,
        call_id: &CallId,
        bundle: TokenBundle,
    ) -> Result<(), IntercomError> {
        let media_requested = self
            .local
            .active
            .as_ref()
            .is_some_and(|a| a.media_requested);
        self.signaling.login(&bundle.uid, &bundle.rtm_token).await?;
        if media_requested {
            self.media.renew_token(&bundle.rtc_token).await?;
        }
        let expires_at = bundle.expires_at;
        if let Some(active) = self.local.active.as_mut() {
            active.tokens = bundle;
        }
        self.restart_call_renewal(call_id, expires_at);
        debug!(call_id = %call_id, %expires_at, "call tokens renewed");
        Ok(())
    }

    fn on_grace_elapsed(&mut self, generation: u64) {
        if generation == self.grace_generation && self.local.phase == CallPhase::Ended {
            self.ended_call = None;
            self.set_phase(CallPhase::Idle);
        }
    }

    async fn on_ringing_timeout(&mut self, call_id: CallId) {
        let unanswered = self.local.active.as_ref().is_some_and(|a| {
            a.call_id == call_id && a.direction == Direction::Outgoing && !a.remote_answered
        });
        if unanswered && matches!(self.local.phase, CallPhase::Ringing | CallPhase::Connecting) {
            info!(call_id = %call_id, "no answer, giving up");
            self.hang_up(TIMEOUT_CAUSE).await;
        }
    }

    async fn on_leave_timeout(&mut self, call_id: CallId) {
        let waiting = self.local.phase == CallPhase::Ending
            && self
                .local
                .active
                .as_ref()
                .is_some_and(|a| a.call_id == call_id);
        if waiting {
            warn!(call_id = %call_id, "media leave was never confirmed");
            self.finish_ended().await;
        }
    }

    fn on_invite_stale(&mut self, call_id: CallId) {
        let matches = self
            .local
            .invite
            .as_ref()
            .is_some_and(|i| i.call_id == call_id);
        if matches {
            info!(call_id = %call_id, "invite no longer pending");
            self.clear_invite();
            self.set_phase(CallPhase::Idle);
        }
    }
}

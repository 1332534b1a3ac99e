//! `SessionActor` - the orchestrator, one per room membership.
//!
//! `MediaSession::start` runs the setup sequence strictly in order:
//!
//! 1. Capability negotiation
//! 2. Send transport, then receive transport
//! 3. Publish camera and microphone (skipped without a send transport)
//! 4. Join the room
//!
//! and then spawns the `SessionActor`, the single writer of all session
//! state. The actor:
//! - Applies room notifications to the peer registry in arrival order
//! - Keeps exactly one `ConsumerActor` per exposed peer
//! - Owns the `ProducerManager` and both transports
//! - Supervises the `LivenessKeeper`
//!
//! # Teardown
//!
//! On leave, cancellation or channel close: consumer managers are cancelled
//! and awaited, producers closed, transports closed, the liveness keeper
//! stopped, and the widget signal flipped to inactive.

use super::consumer::{ConsumerActor, ConsumerActorHandle, ConsumerDeps};
use super::messages::{
    EndReason, PeerPlayback, SessionEvent, SessionMessage, SessionState, Visibility, WidgetSignal,
};

use crate::broadcaster::MediaStateBroadcaster;
use crate::capability::negotiate;
use crate::config::Config;
use crate::engine::MediaDevice;
use crate::errors::{ProduceError, SessionError, TransportFailure};
use crate::liveness::LivenessKeeper;
use crate::media::{CaptureSource, KeepAliveAudio, MediaSink, SinkFactory, TrackEvent};
use crate::observability::metrics;
use crate::producer::ProducerManager;
use crate::registry::{Peer, PeerRegistry, RegistryChange};
use crate::signaling::{ChannelEvent, RpcChannel, Signaling};
use crate::transport::{
    create_transport, Transition, Transport, TransportState, TransportStateReport,
};

use common::error::ProtocolError;
use common::mailbox::{self, ActorType, MailboxReceiver, MailboxSender};
use common::protocol::{JoinRequest, ServerNotification};
use common::types::{Direction, MediaKind, PeerId, TrackSource};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the session mailbox.
const SESSION_CHANNEL_BUFFER: usize = 256;

/// Capacity of the session event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Upper bound on waiting for a child task during teardown.
const CHILD_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Host-provided collaborators of a session.
pub struct SessionDeps {
    /// Request/notify side of the signaling channel.
    pub channel: Arc<dyn RpcChannel>,
    /// Push notifications and close events from the signaling channel.
    pub channel_events: mpsc::Receiver<ChannelEvent>,
    pub device: Arc<dyn MediaDevice>,
    pub capture: Arc<dyn CaptureSource>,
    pub sinks: Arc<dyn SinkFactory>,
    pub keep_alive: Arc<dyn KeepAliveAudio>,
    /// Local preview of the published video, if the host renders one.
    pub preview: Option<Arc<dyn MediaSink>>,
}

/// Handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    sender: MailboxSender<SessionMessage>,
    cancel_token: CancellationToken,
    events: broadcast::Sender<SessionEvent>,
    widget: watch::Receiver<WidgetSignal>,
    room_id: String,
}

impl SessionHandle {
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Flip the microphone and announce the new state. Returns the new state.
    pub async fn toggle_audio(&self) -> Result<bool, SessionError> {
        self.request(|respond_to| SessionMessage::ToggleAudio { respond_to })
            .await
    }

    /// Flip the camera and announce the new state. Returns the new state.
    pub async fn toggle_video(&self) -> Result<bool, SessionError> {
        self.request(|respond_to| SessionMessage::ToggleVideo { respond_to })
            .await
    }

    /// Start screen sharing. `Ok(false)` when already sharing.
    pub async fn share_screen(&self) -> Result<Result<bool, ProduceError>, SessionError> {
        self.request(|respond_to| SessionMessage::ShareScreen { respond_to })
            .await
    }

    /// Stop screen sharing. `false` when not sharing.
    pub async fn stop_screen_share(&self) -> Result<bool, SessionError> {
        self.request(|respond_to| SessionMessage::StopScreenShare { respond_to })
            .await
    }

    pub async fn state(&self) -> Result<SessionState, SessionError> {
        self.request(|respond_to| SessionMessage::GetState { respond_to })
            .await
    }

    /// Remote peers, local participant excluded.
    pub async fn peers(&self) -> Result<Vec<Peer>, SessionError> {
        self.request(|respond_to| SessionMessage::GetPeers { respond_to })
            .await
    }

    /// Playback status of one peer's consumers. `None` for unknown peers.
    pub async fn peer_playback(
        &self,
        peer_id: PeerId,
    ) -> Result<Option<PeerPlayback>, SessionError> {
        self.request(|respond_to| SessionMessage::GetPeerPlayback {
            peer_id,
            respond_to,
        })
        .await
    }

    /// Report host page visibility to the liveness keeper.
    pub async fn set_visibility(&self, visibility: Visibility) -> Result<(), SessionError> {
        self.sender
            .send(SessionMessage::SetVisibility { visibility })
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Show or hide the presentation window.
    pub async fn set_visible(&self, visible: bool) -> Result<(), SessionError> {
        self.sender
            .send(SessionMessage::SetVisible { visible })
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Leave the room. Returns once teardown is complete.
    pub async fn leave(&self) -> Result<(), SessionError> {
        self.request(|respond_to| SessionMessage::Leave { respond_to })
            .await
    }

    /// Subscribe to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Signals for a presentation component hosting the call.
    #[must_use]
    pub fn widget_signal(&self) -> watch::Receiver<WidgetSignal> {
        self.widget.clone()
    }

    /// Cancel the session (tears down like `leave`).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> SessionMessage,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}

/// Entry point of the media session.
pub struct MediaSession;

impl MediaSession {
    /// Run the setup sequence and spawn the session actor.
    ///
    /// # Errors
    ///
    /// - `SessionError::Negotiation` if capability negotiation fails
    /// - `SessionError::Transport` if neither transport can be created
    /// - `SessionError::Signaling` if the room rejects the join
    #[instrument(
        skip_all,
        name = "session.start",
        fields(room_id = %config.room_id, display_name = %config.display_name)
    )]
    pub async fn start(
        config: Config,
        deps: SessionDeps,
    ) -> Result<(SessionHandle, JoinHandle<()>), SessionError> {
        let SessionDeps {
            channel,
            channel_events,
            device,
            capture,
            sinks,
            keep_alive,
            preview,
        } = deps;

        // Transport observers and track watchers report into the actor, so its
        // channels exist first.
        let (sender, receiver) =
            mailbox::channel(ActorType::Session, &config.room_id, SESSION_CHANNEL_BUFFER);
        let (transport_state_tx, transport_states) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let signaling = Signaling::new(channel, config.request_timeout);

        let capability = negotiate(&signaling, device).await.map_err(|e| {
            error!(target: "session.actor", error = %e, "Capability negotiation failed");
            SessionError::from(e)
        })?;

        let send = create_transport(
            &signaling,
            &capability,
            Direction::Send,
            transport_state_tx.clone(),
        )
        .await;
        let receive =
            create_transport(&signaling, &capability, Direction::Receive, transport_state_tx)
                .await;

        let mut transport_failures = Vec::new();
        let (send_transport, receive_transport) = match (send, receive) {
            (Err(send), Err(receive)) => {
                metrics::record_transport_failure(Direction::Send.as_str());
                metrics::record_transport_failure(Direction::Receive.as_str());
                error!(
                    target: "session.actor",
                    send_error = %send,
                    receive_error = %receive,
                    "No transport could be created"
                );
                return Err(SessionError::Transport { send, receive });
            }
            (send, receive) => (
                keep_transport(send, &mut transport_failures),
                keep_transport(receive, &mut transport_failures),
            ),
        };

        let mut producers = ProducerManager::new(
            capture,
            capability.clone(),
            send_transport.as_ref().map(|t| Arc::clone(t.engine())),
            preview,
            sender.clone(),
            cancel_token.child_token(),
        );

        if send_transport.is_some() {
            let report = producers.publish_all().await;
            info!(
                target: "session.actor",
                video = report.video.is_ok(),
                audio = report.audio.is_ok(),
                "Initial publish complete"
            );
        }

        let join = signaling
            .join(JoinRequest {
                rtp_capabilities: capability.rtp_capabilities(),
                display_name: config.display_name.clone(),
                room_id: config.room_id.clone(),
            })
            .await;

        let response = match join {
            Ok(response) => response,
            Err(e) => {
                error!(target: "session.actor", error = %e, "Join rejected");
                producers.close_all();
                for mut transport in [send_transport, receive_transport].into_iter().flatten() {
                    transport.close();
                }
                cancel_token.cancel();
                return Err(SessionError::from(e));
            }
        };

        info!(
            target: "session.actor",
            room_id = %config.room_id,
            peer_id = ?response.peer_id,
            "Joined room"
        );

        let registry = PeerRegistry::new(config.display_name.clone(), response.peer_id);

        let (visibility, visibility_rx) = watch::channel(Visibility::default());
        let liveness_token = cancel_token.child_token();
        let liveness = LivenessKeeper::spawn(
            signaling.clone(),
            keep_alive,
            config.keepalive_interval,
            config.keepalive_gain,
            visibility_rx,
            liveness_token.clone(),
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (widget, widget_rx) = watch::channel(WidgetSignal {
            active: true,
            visible: true,
        });

        for failure in &transport_failures {
            let _ = events.send(SessionEvent::TransportFailed(failure.clone()));
        }

        let consumer_deps = ConsumerDeps {
            signaling: signaling.clone(),
            transport: receive_transport.as_ref().map(|t| Arc::clone(t.engine())),
            sinks,
            health_check_interval: config.health_check_interval,
            playback_settle_delay: config.playback_settle_delay,
        };

        let actor = SessionActor {
            room_id: config.room_id.clone(),
            display_name: config.display_name,
            receiver,
            channel_events,
            transport_states,
            cancel_token: cancel_token.clone(),
            broadcaster: MediaStateBroadcaster::new(signaling),
            send_transport,
            receive_transport,
            transport_failures,
            producers,
            registry,
            consumers: HashMap::new(),
            consumer_deps,
            events: events.clone(),
            widget,
            visibility,
            liveness: Some(liveness),
            liveness_token,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionHandle {
            sender,
            cancel_token,
            events,
            widget: widget_rx,
            room_id: config.room_id,
        };

        Ok((handle, task_handle))
    }
}

/// Record a failed transport and keep a created one.
fn keep_transport(
    result: Result<Transport, TransportFailure>,
    failures: &mut Vec<TransportFailure>,
) -> Option<Transport> {
    match result {
        Ok(transport) => Some(transport),
        Err(failure) => {
            warn!(
                target: "session.actor",
                direction = %failure.direction(),
                error = %failure,
                "Transport unavailable, continuing degraded"
            );
            metrics::record_transport_failure(failure.direction().as_str());
            failures.push(failure);
            None
        }
    }
}

/// A consumer manager owned by the session.
struct ManagedConsumer {
    handle: ConsumerActorHandle,
    task_handle: JoinHandle<()>,
}

pub struct SessionActor {
    room_id: String,
    display_name: String,
    receiver: MailboxReceiver<SessionMessage>,
    channel_events: mpsc::Receiver<ChannelEvent>,
    transport_states: mpsc::UnboundedReceiver<TransportStateReport>,
    cancel_token: CancellationToken,
    broadcaster: MediaStateBroadcaster,
    send_transport: Option<Transport>,
    receive_transport: Option<Transport>,
    transport_failures: Vec<TransportFailure>,
    producers: ProducerManager,
    registry: PeerRegistry,
    consumers: HashMap<PeerId, ManagedConsumer>,
    consumer_deps: ConsumerDeps,
    events: broadcast::Sender<SessionEvent>,
    widget: watch::Sender<WidgetSignal>,
    visibility: watch::Sender<Visibility>,
    liveness: Option<JoinHandle<()>>,
    liveness_token: CancellationToken,
}

impl SessionActor {
    #[instrument(
        skip_all,
        name = "session.actor",
        fields(room_id = %self.room_id, display_name = %self.display_name)
    )]
    async fn run(mut self) {
        info!(
            target: "session.actor",
            room_id = %self.room_id,
            send = self.send_transport.is_some(),
            receive = self.receive_transport.is_some(),
            "SessionActor started"
        );

        loop {
            self.check_consumer_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "session.actor",
                        room_id = %self.room_id,
                        "SessionActor received cancellation signal"
                    );
                    self.shutdown(EndReason::Left).await;
                    break;
                }

                event = self.channel_events.recv() => {
                    match event {
                        Some(ChannelEvent::Notification { method, data }) => {
                            self.handle_notification(&method, data).await;
                        }
                        Some(ChannelEvent::Closed) | None => {
                            warn!(
                                target: "session.actor",
                                room_id = %self.room_id,
                                "Signaling channel closed"
                            );
                            self.shutdown(EndReason::ChannelClosed).await;
                            break;
                        }
                    }
                }

                Some(report) = self.transport_states.recv() => {
                    self.handle_transport_state(report.direction, report.state).await;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(SessionMessage::Leave { respond_to }) => {
                            self.shutdown(EndReason::Left).await;
                            let _ = respond_to.send(());
                            break;
                        }
                        Some(message) => {
                            self.handle_message(message).await;
                        }
                        None => {
                            info!(
                                target: "session.actor",
                                room_id = %self.room_id,
                                "SessionActor channel closed, exiting"
                            );
                            self.shutdown(EndReason::Left).await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "session.actor",
            room_id = %self.room_id,
            messages_processed = self.receiver.monitor().messages_processed(),
            "SessionActor stopped"
        );
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::ToggleAudio { respond_to } => {
                let enabled = self.producers.toggle_audio();
                self.announce(MediaKind::Audio, enabled).await;
                let _ = respond_to.send(enabled);
            }

            SessionMessage::ToggleVideo { respond_to } => {
                let enabled = self.producers.toggle_video();
                self.announce(MediaKind::Video, enabled).await;
                let _ = respond_to.send(enabled);
            }

            SessionMessage::ShareScreen { respond_to } => {
                let result = self.producers.share_screen().await;
                if matches!(result, Ok(true)) {
                    let _ = self
                        .events
                        .send(SessionEvent::ScreenShareChanged { active: true });
                }
                let _ = respond_to.send(result);
            }

            SessionMessage::StopScreenShare { respond_to } => {
                let stopped = self.stop_screen_share();
                let _ = respond_to.send(stopped);
            }

            SessionMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.state());
            }

            SessionMessage::GetPeers { respond_to } => {
                let _ = respond_to.send(self.registry.exposed());
            }

            SessionMessage::GetPeerPlayback {
                peer_id,
                respond_to,
            } => {
                let playback = self
                    .consumers
                    .get(&peer_id)
                    .map(|managed| managed.handle.playback());
                let _ = respond_to.send(playback);
            }

            SessionMessage::SetVisibility { visibility } => {
                debug!(
                    target: "session.actor",
                    hidden = visibility.is_hidden(),
                    "Visibility changed"
                );
                self.visibility.send_replace(visibility);
            }

            SessionMessage::SetVisible { visible } => {
                self.widget.send_modify(|signal| signal.visible = visible);
            }

            SessionMessage::LocalTrackEvent {
                source,
                track_id,
                event,
            } => {
                self.handle_track_event(source, &track_id, event);
            }

            // Handled in the run loop.
            SessionMessage::Leave { respond_to } => {
                let _ = respond_to.send(());
            }
        }
    }

    /// Broadcast a local flag and notify subscribers.
    async fn announce(&self, kind: MediaKind, enabled: bool) {
        self.broadcaster.broadcast(kind, enabled).await;
        let _ = self
            .events
            .send(SessionEvent::LocalMediaChanged { kind, enabled });
    }

    fn stop_screen_share(&mut self) -> bool {
        let stopped = self.producers.stop_screen_share();
        if stopped {
            let _ = self
                .events
                .send(SessionEvent::ScreenShareChanged { active: false });
        }
        stopped
    }

    /// Apply one inbound notification and reconcile consumer managers.
    async fn handle_notification(&mut self, method: &str, data: Value) {
        let notification = match ServerNotification::parse(method, data) {
            Ok(notification) => notification,
            Err(ProtocolError::UnknownMethod(method)) => {
                debug!(
                    target: "session.actor",
                    method = %method,
                    "Notification has no case handler"
                );
                return;
            }
            Err(e) => {
                warn!(
                    target: "session.actor",
                    method = %method,
                    error = %e,
                    "Malformed notification ignored"
                );
                return;
            }
        };

        match self.registry.apply(notification) {
            RegistryChange::Membership => {
                self.reconcile_consumers().await;
                let _ = self
                    .events
                    .send(SessionEvent::PeersChanged(self.registry.exposed()));
            }
            RegistryChange::MediaState { peer_id } => {
                debug!(
                    target: "session.actor",
                    peer_id = %peer_id,
                    "Peer media state changed"
                );
                let _ = self
                    .events
                    .send(SessionEvent::PeersChanged(self.registry.exposed()));
            }
            RegistryChange::None => {}
        }
    }

    /// Keep exactly one consumer manager per exposed peer.
    async fn reconcile_consumers(&mut self) {
        let exposed = self.registry.exposed();

        let stale: Vec<PeerId> = self
            .consumers
            .keys()
            .filter(|id| !exposed.iter().any(|peer| &peer.id == *id))
            .cloned()
            .collect();
        for peer_id in stale {
            if let Some(managed) = self.consumers.remove(&peer_id) {
                self.stop_consumer(&peer_id, managed).await;
            }
        }

        for peer in &exposed {
            if !self.consumers.contains_key(&peer.id) {
                self.spawn_consumer(peer);
            }
        }

        metrics::set_peers_active(exposed.len());
        metrics::set_consumer_managers_active(self.consumers.len());
    }

    fn spawn_consumer(&mut self, peer: &Peer) {
        let (handle, task_handle) = ConsumerActor::spawn(
            peer.id.clone(),
            peer.display_name.clone(),
            self.consumer_deps.clone(),
            self.cancel_token.child_token(),
        );
        debug!(
            target: "session.actor",
            peer_id = %peer.id,
            display_name = %peer.display_name,
            "Consumer manager spawned"
        );
        self.consumers.insert(
            peer.id.clone(),
            ManagedConsumer {
                handle,
                task_handle,
            },
        );
    }

    async fn stop_consumer(&self, peer_id: &PeerId, managed: ManagedConsumer) {
        managed.handle.cancel();
        match tokio::time::timeout(CHILD_SHUTDOWN_TIMEOUT, managed.task_handle).await {
            Ok(Ok(())) => {
                debug!(
                    target: "session.actor",
                    peer_id = %peer_id,
                    "Consumer manager stopped"
                );
            }
            Ok(Err(e)) => {
                warn!(
                    target: "session.actor",
                    peer_id = %peer_id,
                    error = ?e,
                    "Consumer task panicked during shutdown"
                );
            }
            Err(_) => {
                warn!(
                    target: "session.actor",
                    peer_id = %peer_id,
                    "Consumer shutdown timed out"
                );
            }
        }
    }

    async fn stop_all_consumers(&mut self) {
        for managed in self.consumers.values() {
            managed.handle.cancel();
        }
        let drained: Vec<(PeerId, ManagedConsumer)> = self.consumers.drain().collect();
        for (peer_id, managed) in drained {
            self.stop_consumer(&peer_id, managed).await;
        }
    }

    /// Remove consumer managers whose task ended on its own.
    async fn check_consumer_health(&mut self) {
        let finished: Vec<PeerId> = self
            .consumers
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(peer_id, _)| peer_id.clone())
            .collect();

        for peer_id in finished {
            if let Some(managed) = self.consumers.remove(&peer_id) {
                match managed.task_handle.await {
                    Ok(()) => {
                        debug!(
                            target: "session.actor",
                            peer_id = %peer_id,
                            "Consumer actor exited"
                        );
                    }
                    Err(join_error) => {
                        if join_error.is_panic() {
                            error!(
                                target: "session.actor",
                                peer_id = %peer_id,
                                error = ?join_error,
                                "Consumer actor panicked"
                            );
                        }
                    }
                }
            }
        }
    }

    fn transport_slot(&mut self, direction: Direction) -> &mut Option<Transport> {
        match direction {
            Direction::Send => &mut self.send_transport,
            Direction::Receive => &mut self.receive_transport,
        }
    }

    async fn handle_transport_state(&mut self, direction: Direction, state: TransportState) {
        let Some(transport) = self.transport_slot(direction).as_mut() else {
            debug!(
                target: "session.transport",
                direction = %direction,
                state = %state,
                "State change for released transport ignored"
            );
            return;
        };

        match transport.apply(state) {
            Transition::Unchanged => return,
            Transition::Rejected { from, to } => {
                debug!(
                    target: "session.transport",
                    direction = %direction,
                    from = %from,
                    to = %to,
                    "Transition not allowed, ignored"
                );
                return;
            }
            Transition::Changed { from, to } => {
                info!(
                    target: "session.transport",
                    direction = %direction,
                    transport_id = %transport.id(),
                    from = %from,
                    to = %to,
                    "Transport state changed"
                );
            }
        }

        match state {
            TransportState::Failed => {
                let failure = TransportFailure::ConnectionFailed { direction };
                warn!(
                    target: "session.transport",
                    direction = %direction,
                    sibling = %direction.sibling(),
                    "Transport failed, continuing on sibling"
                );
                metrics::record_transport_failure(direction.as_str());
                self.transport_failures.push(failure.clone());
                self.release_transport(direction).await;
                let _ = self.events.send(SessionEvent::TransportFailed(failure));
            }
            TransportState::Closed => {
                self.release_transport(direction).await;
            }
            TransportState::New | TransportState::Connecting | TransportState::Connected => {}
        }
    }

    /// Close a transport and everything bound to it.
    async fn release_transport(&mut self, direction: Direction) {
        if let Some(mut transport) = self.transport_slot(direction).take() {
            transport.close();
        }

        match direction {
            Direction::Send => self.producers.release_transport(),
            Direction::Receive => {
                self.consumer_deps.transport = None;
                self.stop_all_consumers().await;
                // Managers stay registered per peer but idle.
                self.reconcile_consumers().await;
            }
        }
    }

    fn handle_track_event(&mut self, source: TrackSource, track_id: &str, event: TrackEvent) {
        if !self.producers.is_current_track(source, track_id) {
            return;
        }

        match (source, event) {
            (TrackSource::Screen, TrackEvent::Ended) => {
                info!(
                    target: "session.producer",
                    track_id = %track_id,
                    "Screen capture ended by host"
                );
                self.stop_screen_share();
            }
            (_, TrackEvent::Ended) => {
                warn!(
                    target: "session.producer",
                    source = %source,
                    track_id = %track_id,
                    "Local track ended"
                );
            }
            (_, TrackEvent::Muted | TrackEvent::Unmuted) => {
                debug!(
                    target: "session.producer",
                    source = %source,
                    track_id = %track_id,
                    event = ?event,
                    "Local track event"
                );
            }
        }
    }

    fn state(&self) -> SessionState {
        SessionState {
            room_id: self.room_id.clone(),
            display_name: self.display_name.clone(),
            local_peer_id: self.registry.local_peer_id().cloned(),
            local_media: self.producers.state(),
            send_transport: self.send_transport.as_ref().map(Transport::state),
            receive_transport: self.receive_transport.as_ref().map(Transport::state),
            transport_failures: self.transport_failures.clone(),
            peers: self.registry.exposed(),
            consumer_managers: self.consumers.len(),
        }
    }

    /// Tear the session down.
    async fn shutdown(&mut self, reason: EndReason) {
        info!(
            target: "session.actor",
            room_id = %self.room_id,
            reason = reason.as_str(),
            consumers = self.consumers.len(),
            "Performing session teardown"
        );

        self.stop_all_consumers().await;
        self.producers.close_all();
        for direction in [Direction::Send, Direction::Receive] {
            if let Some(mut transport) = self.transport_slot(direction).take() {
                transport.close();
            }
        }

        self.liveness_token.cancel();
        if let Some(liveness) = self.liveness.take() {
            if tokio::time::timeout(CHILD_SHUTDOWN_TIMEOUT, liveness)
                .await
                .is_err()
            {
                warn!(
                    target: "session.actor",
                    room_id = %self.room_id,
                    "Liveness keeper shutdown timed out"
                );
            }
        }

        self.cancel_token.cancel();
        self.widget.send_modify(|signal| signal.active = false);
        metrics::set_peers_active(0);
        metrics::set_consumer_managers_active(0);
        let _ = self.events.send(SessionEvent::Ended(reason));

        info!(
            target: "session.actor",
            room_id = %self.room_id,
            "Session teardown complete"
        );
    }
}

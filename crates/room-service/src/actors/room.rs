//! `RoomActor` - per-room actor that owns membership and routing state.
//!
//! Each `RoomActor`:
//! - Owns every connected peer and its transports, producers and consumers
//! - Owns the room's `MediaRouter`
//! - Fans presence out: `setAvailablePeers` to a joiner, `peerJoined`,
//!   `peerLeft` and `peerMediaStateChanged` to everyone else
//!
//! # Membership
//!
//! 1. A peer is connected (registered with its outbound channel, not visible)
//! 2. `join` makes it visible to the other joined peers
//! 3. Disconnect closes its transports and producers and announces `peerLeft`
//!
//! The actor exits once its last peer disconnects.

use super::messages::{RoomMessage, RoomPeerInfo, RoomState};

use crate::errors::{RoomError, RouterError};
use crate::router::MediaRouter;

use chrono::{DateTime, Utc};
use common::mailbox::{self, ActorType, MailboxReceiver, MailboxSender};
use common::protocol::{
    self, methods, AvailablePeers, ConnectTransportRequest, ConsumeRequest, ConsumeResponse,
    JoinRequest, JoinResponse, MediaStateChange, PeerDetails, PeerLeft, PeerMediaStateChanged,
    ProduceRequest, ProduceResponse, ResumeConsumerRequest, RtpCapabilities, ServerNotification,
};
use common::types::{ConsumerId, Direction, MediaKind, PeerId, ProducerId, TransportId};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 500;

/// Handle to a `RoomActor`.
#[derive(Clone, Debug)]
pub struct RoomActorHandle {
    sender: MailboxSender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: String,
}

impl RoomActorHandle {
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Register a connected peer.
    pub async fn connect(
        &self,
        peer_id: PeerId,
        outbound: mpsc::Sender<ServerNotification>,
    ) -> Result<(), RoomError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoomMessage::Connect {
                peer_id,
                outbound,
                respond_to: tx,
            })
            .await
            .map_err(|_| RoomError::Closed)?;

        rx.await.map_err(|_| RoomError::Closed)?
    }

    /// Handle a signaling request from `peer_id`.
    pub async fn request(
        &self,
        peer_id: PeerId,
        method: &str,
        payload: Value,
    ) -> Result<Value, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoomMessage::Request {
                peer_id,
                method: method.to_string(),
                payload,
                respond_to: tx,
            })
            .await
            .map_err(|_| RoomError::Closed)?;

        rx.await.map_err(|_| RoomError::Closed)?
    }

    /// Handle a signaling notification from `peer_id`.
    pub async fn notify(
        &self,
        peer_id: PeerId,
        method: &str,
        payload: Value,
    ) -> Result<(), RoomError> {
        self.sender
            .send(RoomMessage::Notify {
                peer_id,
                method: method.to_string(),
                payload,
            })
            .await
            .map_err(|_| RoomError::Closed)
    }

    /// Report that `peer_id`'s channel closed.
    pub async fn disconnect(&self, peer_id: PeerId) -> Result<(), RoomError> {
        self.sender
            .send(RoomMessage::Disconnect { peer_id })
            .await
            .map_err(|_| RoomError::Closed)
    }

    pub async fn state(&self) -> Result<RoomState, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoomMessage::GetState { respond_to: tx })
            .await
            .map_err(|_| RoomError::Closed)?;

        rx.await.map_err(|_| RoomError::Closed)
    }

    /// Whether the actor has exited.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// A connected peer.
struct RoomPeer {
    id: PeerId,
    display_name: String,
    joined: bool,
    audio_enabled: bool,
    video_enabled: bool,
    rtp_capabilities: RtpCapabilities,
    send_transport: Option<TransportId>,
    receive_transport: Option<TransportId>,
    producers: Vec<(ProducerId, MediaKind)>,
    /// Owned consumers and the producer each one reads.
    consumers: Vec<(ConsumerId, ProducerId)>,
    outbound: mpsc::Sender<ServerNotification>,
    last_seen: DateTime<Utc>,
}

impl RoomPeer {
    fn details(&self) -> PeerDetails {
        PeerDetails {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            audio_enabled: self.audio_enabled,
            video_enabled: self.video_enabled,
        }
    }

    fn info(&self) -> RoomPeerInfo {
        RoomPeerInfo {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            joined: self.joined,
            audio_enabled: self.audio_enabled,
            video_enabled: self.video_enabled,
            producers: self.producers.len(),
            consumers: self.consumers.len(),
            last_seen: self.last_seen,
        }
    }

    fn transport(&self, direction: Direction) -> Result<&TransportId, RoomError> {
        let slot = match direction {
            Direction::Send => &self.send_transport,
            Direction::Receive => &self.receive_transport,
        };
        slot.as_ref().ok_or_else(|| RoomError::TransportNotFound {
            peer_id: self.id.clone(),
            direction,
        })
    }

    /// Queue a notification without blocking the room.
    fn send(&self, notification: ServerNotification) {
        if let Err(e) = self.outbound.try_send(notification) {
            warn!(
                target: "room.actor",
                peer_id = %self.id,
                error = %e,
                "Dropped notification to peer"
            );
        }
    }
}

pub struct RoomActor {
    room_id: String,
    max_peers: usize,
    router: Arc<dyn MediaRouter>,
    receiver: MailboxReceiver<RoomMessage>,
    cancel_token: CancellationToken,
    /// Connection order.
    peers: Vec<RoomPeer>,
}

impl RoomActor {
    /// Spawn a room actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        room_id: String,
        max_peers: usize,
        router: Arc<dyn MediaRouter>,
        cancel_token: CancellationToken,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mailbox::channel(ActorType::Room, &room_id, ROOM_CHANNEL_BUFFER);

        let actor = Self {
            room_id: room_id.clone(),
            max_peers,
            router,
            receiver,
            cancel_token: cancel_token.clone(),
            peers: Vec::new(),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            room_id,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "room.actor", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        info!(
            target: "room.actor",
            room_id = %self.room_id,
            "RoomActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "room.actor",
                        room_id = %self.room_id,
                        "RoomActor received cancellation signal"
                    );
                    self.close_all();
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message).await;

                            if self.peers.is_empty() {
                                info!(
                                    target: "room.actor",
                                    room_id = %self.room_id,
                                    "Room empty, exiting"
                                );
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        info!(
            target: "room.actor",
            room_id = %self.room_id,
            messages_processed = self.receiver.monitor().messages_processed(),
            "RoomActor stopped"
        );
    }

    async fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::Connect {
                peer_id,
                outbound,
                respond_to,
            } => {
                let _ = respond_to.send(self.connect(peer_id, outbound));
            }

            RoomMessage::Request {
                peer_id,
                method,
                payload,
                respond_to,
            } => {
                let result = self.handle_request(&peer_id, &method, payload).await;
                if let Err(e) = &result {
                    warn!(
                        target: "room.actor",
                        room_id = %self.room_id,
                        peer_id = %peer_id,
                        method = %method,
                        error = %e,
                        "Request failed"
                    );
                }
                let _ = respond_to.send(result);
            }

            RoomMessage::Notify {
                peer_id,
                method,
                payload,
            } => {
                self.handle_notify(&peer_id, &method, payload).await;
            }

            RoomMessage::Disconnect { peer_id } => {
                self.disconnect(&peer_id);
            }

            RoomMessage::GetState { respond_to } => {
                let _ = respond_to.send(RoomState {
                    room_id: self.room_id.clone(),
                    peers: self.peers.iter().map(RoomPeer::info).collect(),
                });
            }
        }
    }

    fn connect(
        &mut self,
        peer_id: PeerId,
        outbound: mpsc::Sender<ServerNotification>,
    ) -> Result<(), RoomError> {
        if self.peer(&peer_id).is_ok() {
            return Err(RoomError::Internal(format!(
                "peer {peer_id} already connected"
            )));
        }

        debug!(
            target: "room.actor",
            room_id = %self.room_id,
            peer_id = %peer_id,
            "Peer connected"
        );

        self.peers.push(RoomPeer {
            id: peer_id,
            display_name: String::new(),
            joined: false,
            audio_enabled: true,
            video_enabled: true,
            rtp_capabilities: RtpCapabilities::default(),
            send_transport: None,
            receive_transport: None,
            producers: Vec::new(),
            consumers: Vec::new(),
            outbound,
            last_seen: Utc::now(),
        });
        Ok(())
    }

    async fn handle_request(
        &mut self,
        peer_id: &PeerId,
        method: &str,
        payload: Value,
    ) -> Result<Value, RoomError> {
        self.peer(peer_id)?;

        match method {
            methods::GET_ROUTER_RTP_CAPABILITIES => encode(&self.router.rtp_capabilities()),
            methods::CREATE_PRODUCER_TRANSPORT => {
                self.create_transport(peer_id, Direction::Send).await
            }
            methods::CREATE_CONSUMER_TRANSPORT => {
                self.create_transport(peer_id, Direction::Receive).await
            }
            methods::CONNECT_PRODUCER_TRANSPORT => {
                let request = protocol::from_payload(method, payload)?;
                self.connect_transport(peer_id, Direction::Send, request)
                    .await
            }
            methods::CONNECT_CONSUMER_TRANSPORT => {
                let request = protocol::from_payload(method, payload)?;
                self.connect_transport(peer_id, Direction::Receive, request)
                    .await
            }
            methods::PRODUCE => {
                let request = protocol::from_payload(method, payload)?;
                self.produce(peer_id, request).await
            }
            methods::CONSUME => {
                let request = protocol::from_payload(method, payload)?;
                self.consume(peer_id, request).await
            }
            methods::JOIN => {
                let request = protocol::from_payload(method, payload)?;
                self.join(peer_id, request)
            }
            methods::RESUME_CONSUMER | methods::MEDIA_STATE_CHANGED | methods::PING => {
                self.handle_notify(peer_id, method, payload).await;
                Ok(Value::Object(Map::new()))
            }
            other => Err(RoomError::UnknownMethod(other.to_string())),
        }
    }

    async fn handle_notify(&mut self, peer_id: &PeerId, method: &str, payload: Value) {
        let result = match method {
            methods::RESUME_CONSUMER => match protocol::from_payload(method, payload) {
                Ok(request) => self.resume_consumer(peer_id, request).await,
                Err(e) => Err(e.into()),
            },
            methods::MEDIA_STATE_CHANGED => match protocol::from_payload(method, payload) {
                Ok(change) => self.media_state_changed(peer_id, change),
                Err(e) => Err(e.into()),
            },
            methods::PING => self.ping(peer_id),
            other => {
                debug!(
                    target: "room.actor",
                    room_id = %self.room_id,
                    method = %other,
                    "Notification has no case handler"
                );
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!(
                target: "room.actor",
                room_id = %self.room_id,
                peer_id = %peer_id,
                method = %method,
                error = %e,
                "Notification failed"
            );
        }
    }

    async fn create_transport(
        &mut self,
        peer_id: &PeerId,
        direction: Direction,
    ) -> Result<Value, RoomError> {
        let options = self.router.create_webrtc_transport().await?;
        let peer = self.peer_mut(peer_id)?;
        let slot = match direction {
            Direction::Send => &mut peer.send_transport,
            Direction::Receive => &mut peer.receive_transport,
        };
        let previous = slot.replace(options.id.clone());
        if let Some(previous) = previous {
            self.router.close_transport(&previous);
        }

        debug!(
            target: "room.actor",
            room_id = %self.room_id,
            peer_id = %peer_id,
            direction = %direction,
            transport_id = %options.id,
            "Transport created"
        );
        encode(&options)
    }

    async fn connect_transport(
        &mut self,
        peer_id: &PeerId,
        direction: Direction,
        request: ConnectTransportRequest,
    ) -> Result<Value, RoomError> {
        let transport_id = self.peer(peer_id)?.transport(direction)?.clone();
        self.router
            .connect_transport(&transport_id, request.dtls_parameters)
            .await?;
        Ok(Value::Object(Map::new()))
    }

    async fn produce(
        &mut self,
        peer_id: &PeerId,
        request: ProduceRequest,
    ) -> Result<Value, RoomError> {
        let transport_id = self.peer(peer_id)?.transport(Direction::Send)?.clone();
        if transport_id != request.transport_id {
            return Err(RoomError::TransportNotFound {
                peer_id: peer_id.clone(),
                direction: Direction::Send,
            });
        }

        let producer_id = self
            .router
            .produce(&transport_id, request.kind, request.rtp_parameters)
            .await?;
        self.peer_mut(peer_id)?
            .producers
            .push((producer_id.clone(), request.kind));

        info!(
            target: "room.actor",
            room_id = %self.room_id,
            peer_id = %peer_id,
            producer_id = %producer_id,
            kind = %request.kind,
            "Producer created"
        );
        encode(&ProduceResponse { id: producer_id })
    }

    /// Create a paused consumer for every producer of the named peer that
    /// the requester can receive.
    async fn consume(
        &mut self,
        peer_id: &PeerId,
        request: ConsumeRequest,
    ) -> Result<Value, RoomError> {
        let requester = self.peer(peer_id)?;
        let transport_id = requester.transport(Direction::Receive)?.clone();
        let capabilities = requester.rtp_capabilities.clone();
        let producers = self.peer(&request.peer_id)?.producers.clone();

        let mut details = Vec::with_capacity(producers.len());
        for (producer_id, kind) in producers {
            if !self.router.can_consume(&producer_id, &capabilities) {
                debug!(
                    target: "room.actor",
                    room_id = %self.room_id,
                    peer_id = %peer_id,
                    producer_id = %producer_id,
                    kind = %kind,
                    "Producer not consumable with peer capabilities"
                );
                continue;
            }

            match self
                .router
                .consume(&transport_id, &producer_id, &capabilities)
                .await
            {
                Ok(consumer) => details.push(consumer),
                Err(e) => {
                    warn!(
                        target: "room.actor",
                        room_id = %self.room_id,
                        peer_id = %peer_id,
                        producer_id = %producer_id,
                        error = %e,
                        "Consumer creation failed"
                    );
                }
            }
        }

        let requester = self.peer_mut(peer_id)?;
        requester
            .consumers
            .extend(details.iter().map(|d| (d.id.clone(), d.producer_id.clone())));

        encode(&ConsumeResponse {
            consumer_details_array: details,
        })
    }

    fn join(&mut self, peer_id: &PeerId, request: JoinRequest) -> Result<Value, RoomError> {
        let already_joined = self.peer(peer_id)?.joined;
        let joined = self.peers.iter().filter(|p| p.joined).count();
        if !already_joined && joined >= self.max_peers {
            return Err(RoomError::RoomFull {
                max_peers: self.max_peers,
            });
        }

        let peer = self.peer_mut(peer_id)?;
        peer.joined = true;
        peer.display_name = request.display_name;
        peer.rtp_capabilities = request.rtp_capabilities;
        let details = peer.details();

        let others: Vec<PeerDetails> = self
            .peers
            .iter()
            .filter(|p| p.joined && &p.id != peer_id)
            .map(RoomPeer::details)
            .collect();

        for other in self.peers.iter().filter(|p| p.joined && &p.id != peer_id) {
            other.send(ServerNotification::PeerJoined(details.clone()));
        }
        self.peer(peer_id)?
            .send(ServerNotification::SetAvailablePeers(AvailablePeers {
                other_peer_details: others,
            }));

        info!(
            target: "room.actor",
            room_id = %self.room_id,
            peer_id = %peer_id,
            display_name = %details.display_name,
            room_size = joined + usize::from(!already_joined),
            "Peer joined"
        );
        encode(&JoinResponse {
            peer_id: Some(peer_id.clone()),
        })
    }

    async fn resume_consumer(
        &mut self,
        peer_id: &PeerId,
        request: ResumeConsumerRequest,
    ) -> Result<(), RoomError> {
        let owns = self
            .peer(peer_id)?
            .consumers
            .iter()
            .any(|(consumer_id, _)| consumer_id == &request.consumer_id);
        if !owns {
            return Err(RouterError::ConsumerNotFound(request.consumer_id).into());
        }
        self.router.resume_consumer(&request.consumer_id).await?;
        Ok(())
    }

    fn media_state_changed(
        &mut self,
        peer_id: &PeerId,
        change: MediaStateChange,
    ) -> Result<(), RoomError> {
        let peer = self.peer_mut(peer_id)?;
        match change.kind {
            MediaKind::Audio => peer.audio_enabled = change.enabled,
            MediaKind::Video => peer.video_enabled = change.enabled,
        }

        let notification = ServerNotification::PeerMediaStateChanged(PeerMediaStateChanged {
            peer_id: peer_id.clone(),
            kind: change.kind,
            enabled: change.enabled,
        });
        for other in self.peers.iter().filter(|p| p.joined && &p.id != peer_id) {
            other.send(notification.clone());
        }

        debug!(
            target: "room.actor",
            room_id = %self.room_id,
            peer_id = %peer_id,
            kind = %change.kind,
            enabled = change.enabled,
            "Peer media state changed"
        );
        Ok(())
    }

    fn ping(&mut self, peer_id: &PeerId) -> Result<(), RoomError> {
        self.peer_mut(peer_id)?.last_seen = Utc::now();
        Ok(())
    }

    /// Remove a peer, release its routing resources and announce the departure.
    fn disconnect(&mut self, peer_id: &PeerId) {
        let Some(index) = self.peers.iter().position(|p| &p.id == peer_id) else {
            debug!(
                target: "room.actor",
                room_id = %self.room_id,
                peer_id = %peer_id,
                "Disconnect for unknown peer ignored"
            );
            return;
        };
        let peer = self.peers.remove(index);
        self.release(&peer);

        // The router closes consumers with their producer.
        for other in &mut self.peers {
            other
                .consumers
                .retain(|(_, producer_id)| !peer.producers.iter().any(|(p, _)| p == producer_id));
        }

        if peer.joined {
            for other in self.peers.iter().filter(|p| p.joined) {
                other.send(ServerNotification::PeerLeft(PeerLeft {
                    id: peer.id.clone(),
                }));
            }
        }

        info!(
            target: "room.actor",
            room_id = %self.room_id,
            peer_id = %peer_id,
            remaining = self.peers.len(),
            "Peer left"
        );
    }

    fn release(&self, peer: &RoomPeer) {
        for (producer_id, _) in &peer.producers {
            self.router.close_producer(producer_id);
        }
        for transport_id in [&peer.send_transport, &peer.receive_transport]
            .into_iter()
            .flatten()
        {
            self.router.close_transport(transport_id);
        }
    }

    fn close_all(&mut self) {
        for peer in &self.peers {
            self.release(peer);
        }
        self.peers.clear();
    }

    fn peer(&self, peer_id: &PeerId) -> Result<&RoomPeer, RoomError> {
        self.peers
            .iter()
            .find(|p| &p.id == peer_id)
            .ok_or_else(|| RoomError::PeerNotFound(peer_id.clone()))
    }

    fn peer_mut(&mut self, peer_id: &PeerId) -> Result<&mut RoomPeer, RoomError> {
        self.peers
            .iter_mut()
            .find(|p| &p.id == peer_id)
            .ok_or_else(|| RoomError::PeerNotFound(peer_id.clone()))
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, RoomError> {
    protocol::to_payload(value).map_err(|e| RoomError::Internal(e.to_string()))
}

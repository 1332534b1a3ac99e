//! `RoomControllerActor` - singleton supervisor for room actors.
//!
//! - Creates a room (and its router) on the first connection to a room id
//! - Assigns each connection a fresh `PeerId`
//! - Forgets rooms whose actor exited because they emptied
//! - Owns the root `CancellationToken`
//!
//! A connection can race a room that is emptying; the controller then
//! replaces the room with a fresh one.

use super::messages::{ControllerMessage, ControllerStatus};
use super::room::{RoomActor, RoomActorHandle};

use crate::config::Config;
use crate::errors::RoomError;
use crate::router::MediaWorker;

use chrono::{DateTime, Utc};
use common::mailbox::{self, ActorType, MailboxReceiver, MailboxSender};
use common::protocol::{default_media_codecs, ServerNotification};
use common::types::PeerId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the controller mailbox.
const CONTROLLER_CHANNEL_BUFFER: usize = 1000;

/// Upper bound on waiting for a room during shutdown.
const ROOM_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the `RoomControllerActor`.
#[derive(Clone)]
pub struct RoomControllerHandle {
    sender: MailboxSender<ControllerMessage>,
    cancel_token: CancellationToken,
}

impl RoomControllerHandle {
    /// Spawn the controller and return a handle to it.
    #[must_use]
    pub fn new(config: Config, worker: Arc<dyn MediaWorker>) -> Self {
        let (sender, receiver) =
            mailbox::channel(ActorType::Controller, "room-controller", CONTROLLER_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = RoomControllerActor::new(config, worker, receiver, cancel_token.clone());
        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Connect a peer to `room_id` (the default room when `None`).
    ///
    /// Notifications for the peer are delivered on `outbound`.
    pub async fn connect(
        &self,
        room_id: Option<String>,
        outbound: mpsc::Sender<ServerNotification>,
    ) -> Result<(RoomActorHandle, PeerId), RoomError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ControllerMessage::Connect {
                room_id,
                outbound,
                respond_to: tx,
            })
            .await
            .map_err(|e| RoomError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))?
    }

    pub async fn status(&self) -> Result<ControllerStatus, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ControllerMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| RoomError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Internal state for a managed room.
struct ManagedRoom {
    handle: RoomActorHandle,
    task_handle: JoinHandle<()>,
    created_at: DateTime<Utc>,
}

pub struct RoomControllerActor {
    config: Config,
    worker: Arc<dyn MediaWorker>,
    receiver: MailboxReceiver<ControllerMessage>,
    cancel_token: CancellationToken,
    rooms: HashMap<String, ManagedRoom>,
}

impl RoomControllerActor {
    fn new(
        config: Config,
        worker: Arc<dyn MediaWorker>,
        receiver: MailboxReceiver<ControllerMessage>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            worker,
            receiver,
            cancel_token,
            rooms: HashMap::new(),
        }
    }

    #[instrument(skip_all, name = "room.controller")]
    async fn run(mut self) {
        info!(target: "room.controller", "RoomControllerActor started");

        loop {
            self.check_room_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "room.controller",
                        "RoomControllerActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message).await;
                        }
                        None => {
                            info!(
                                target: "room.controller",
                                "RoomControllerActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "room.controller",
            rooms_remaining = self.rooms.len(),
            messages_processed = self.receiver.monitor().messages_processed(),
            "RoomControllerActor stopped"
        );
    }

    async fn handle_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::Connect {
                room_id,
                outbound,
                respond_to,
            } => {
                let room_id = room_id
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| self.config.default_room_id.clone());
                let result = self.connect(room_id, outbound).await;
                let _ = respond_to.send(result);
            }

            ControllerMessage::GetStatus { respond_to } => {
                let mut room_ids: Vec<String> = self
                    .rooms
                    .iter()
                    .filter(|(_, room)| !room.handle.is_closed())
                    .map(|(id, _)| id.clone())
                    .collect();
                room_ids.sort();
                let _ = respond_to.send(ControllerStatus { room_ids });
            }
        }
    }

    async fn connect(
        &mut self,
        room_id: String,
        outbound: mpsc::Sender<ServerNotification>,
    ) -> Result<(RoomActorHandle, PeerId), RoomError> {
        let peer_id = PeerId::new();

        if let Some(room) = self.rooms.get(&room_id) {
            let handle = room.handle.clone();
            match handle.connect(peer_id.clone(), outbound.clone()).await {
                Ok(()) => return Ok((handle, peer_id)),
                Err(RoomError::Closed) => {
                    debug!(
                        target: "room.controller",
                        room_id = %room_id,
                        "Room closed while connecting, recreating"
                    );
                    self.rooms.remove(&room_id);
                }
                Err(e) => return Err(e),
            }
        }

        let handle = self.create_room(&room_id).await?;
        handle.connect(peer_id.clone(), outbound).await?;
        Ok((handle, peer_id))
    }

    async fn create_room(&mut self, room_id: &str) -> Result<RoomActorHandle, RoomError> {
        let router = self.worker.create_router(default_media_codecs()).await?;
        let (handle, task_handle) = RoomActor::spawn(
            room_id.to_string(),
            self.config.max_peers,
            router,
            self.cancel_token.child_token(),
        );

        info!(
            target: "room.controller",
            room_id = %room_id,
            "Room created"
        );

        self.rooms.insert(
            room_id.to_string(),
            ManagedRoom {
                handle: handle.clone(),
                task_handle,
                created_at: Utc::now(),
            },
        );
        Ok(handle)
    }

    /// Forget rooms whose actor has exited.
    async fn check_room_health(&mut self) {
        let finished: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, room)| room.task_handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();

        for room_id in finished {
            if let Some(room) = self.rooms.remove(&room_id) {
                let lifetime = Utc::now() - room.created_at;
                match room.task_handle.await {
                    Ok(()) => {
                        info!(
                            target: "room.controller",
                            room_id = %room_id,
                            lifetime_seconds = lifetime.num_seconds(),
                            "Room removed"
                        );
                    }
                    Err(join_error) => {
                        if join_error.is_panic() {
                            error!(
                                target: "room.controller",
                                room_id = %room_id,
                                error = ?join_error,
                                "Room actor panicked"
                            );
                        }
                    }
                }
            }
        }
    }

    async fn graceful_shutdown(&mut self) {
        info!(
            target: "room.controller",
            rooms = self.rooms.len(),
            "Performing graceful shutdown"
        );

        for room in self.rooms.values() {
            room.handle.cancel();
        }

        for (room_id, room) in self.rooms.drain() {
            match tokio::time::timeout(ROOM_SHUTDOWN_TIMEOUT, room.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "room.controller",
                        room_id = %room_id,
                        "Room completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "room.controller",
                        room_id = %room_id,
                        error = ?e,
                        "Room task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "room.controller",
                        room_id = %room_id,
                        "Room shutdown timed out"
                    );
                }
            }
        }
    }
}

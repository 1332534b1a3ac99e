//! Message and state types for the room actors.

use super::room::RoomActorHandle;
use crate::errors::RoomError;

use chrono::{DateTime, Utc};
use common::protocol::ServerNotification;
use common::types::PeerId;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

/// Messages handled by the `RoomControllerActor`.
#[derive(Debug)]
pub enum ControllerMessage {
    /// Connect a new peer, creating the room on demand.
    Connect {
        /// `None` selects the configured default room.
        room_id: Option<String>,
        outbound: mpsc::Sender<ServerNotification>,
        respond_to: oneshot::Sender<Result<(RoomActorHandle, PeerId), RoomError>>,
    },

    /// Controller status.
    GetStatus {
        respond_to: oneshot::Sender<ControllerStatus>,
    },
}

/// Messages handled by a `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    /// Register a connected, not yet joined, peer.
    Connect {
        peer_id: PeerId,
        outbound: mpsc::Sender<ServerNotification>,
        respond_to: oneshot::Sender<Result<(), RoomError>>,
    },

    /// A signaling request from a peer.
    Request {
        peer_id: PeerId,
        method: String,
        payload: Value,
        respond_to: oneshot::Sender<Result<Value, RoomError>>,
    },

    /// A signaling notification from a peer.
    Notify {
        peer_id: PeerId,
        method: String,
        payload: Value,
    },

    /// The peer's channel closed.
    Disconnect { peer_id: PeerId },

    /// Room snapshot.
    GetState {
        respond_to: oneshot::Sender<RoomState>,
    },
}

/// One peer as seen by the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomPeerInfo {
    pub id: PeerId,
    pub display_name: String,
    pub joined: bool,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub producers: usize,
    pub consumers: usize,
    pub last_seen: DateTime<Utc>,
}

/// Snapshot of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomState {
    pub room_id: String,
    pub peers: Vec<RoomPeerInfo>,
}

impl RoomState {
    /// Peers that completed `join`.
    #[must_use]
    pub fn joined(&self) -> Vec<&RoomPeerInfo> {
        self.peers.iter().filter(|p| p.joined).collect()
    }
}

/// Controller status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerStatus {
    pub room_ids: Vec<String>,
}

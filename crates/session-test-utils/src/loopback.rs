//! In-process signaling channel wired to a real room service.
//!
//! Lets end-to-end tests run a media session against `RoomControllerHandle`
//! and a mock router, with no network in between. Room notifications are
//! forwarded as `ChannelEvent`s; when the room drops the peer, the event
//! stream ends with `Closed`.

use async_trait::async_trait;
use common::protocol::ServerNotification;
use common::types::PeerId;
use media_session::errors::SignalingError;
use media_session::signaling::{ChannelEvent, RpcChannel};
use room_service::{RoomActorHandle, RoomControllerHandle, RoomError};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

const LOOPBACK_BUFFER: usize = 64;

/// A peer's connection to a room actor.
pub struct LoopbackChannel {
    room: RoomActorHandle,
    peer_id: PeerId,
}

impl LoopbackChannel {
    /// Connect a new peer to `room_id` and start forwarding its notifications.
    pub async fn connect(
        controller: &RoomControllerHandle,
        room_id: Option<String>,
    ) -> Result<(Arc<Self>, mpsc::Receiver<ChannelEvent>), RoomError> {
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerNotification>(LOOPBACK_BUFFER);
        let (events_tx, events_rx) = mpsc::channel(LOOPBACK_BUFFER);

        let (room, peer_id) = controller.connect(room_id, outbound_tx).await?;

        tokio::spawn(async move {
            while let Some(notification) = outbound_rx.recv().await {
                let Ok(data) = notification.to_payload() else {
                    continue;
                };
                let event = ChannelEvent::Notification {
                    method: notification.method().to_string(),
                    data,
                };
                if events_tx.send(event).await.is_err() {
                    return;
                }
            }
            let _ = events_tx.send(ChannelEvent::Closed).await;
        });

        Ok((Arc::new(Self { room, peer_id }), events_rx))
    }

    /// Id the room assigned to this connection.
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    #[must_use]
    pub fn room(&self) -> &RoomActorHandle {
        &self.room
    }

    /// Drop the connection, as when the socket closes.
    pub async fn close(&self) {
        let _ = self.room.disconnect(self.peer_id.clone()).await;
    }
}

#[async_trait]
impl RpcChannel for LoopbackChannel {
    async fn request(&self, method: &str, payload: Value) -> Result<Value, SignalingError> {
        self.room
            .request(self.peer_id.clone(), method, payload)
            .await
            .map_err(|e| match e {
                RoomError::Closed => SignalingError::ChannelClosed,
                other => SignalingError::Rejected {
                    method: method.to_string(),
                    reason: other.client_message(),
                },
            })
    }

    async fn notify(&self, method: &str, payload: Value) -> Result<(), SignalingError> {
        self.room
            .notify(self.peer_id.clone(), method, payload)
            .await
            .map_err(|_| SignalingError::ChannelClosed)
    }
}

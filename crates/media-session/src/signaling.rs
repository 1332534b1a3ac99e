//! Typed access to the RPC signaling channel.
//!
//! `RpcChannel` is the raw request/notify seam. `Signaling` wraps it with
//! the method names and payload types of the room protocol and bounds every
//! request with a timeout.

use crate::errors::SignalingError;
use crate::observability::metrics;

use async_trait::async_trait;
use common::protocol::{
    self, methods, ConnectTransportRequest, ConsumeRequest, ConsumeResponse, DtlsParameters,
    JoinRequest, JoinResponse, MediaStateChange, Ping, ProduceRequest, ProduceResponse,
    ResumeConsumerRequest, RtpCapabilities, TransportOptions,
};
use common::types::{ConsumerId, Direction, MediaKind, PeerId, ProducerId, TransportId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Bidirectional RPC channel to the room.
#[async_trait]
pub trait RpcChannel: Send + Sync {
    /// Send a request and wait for its result.
    async fn request(&self, method: &str, payload: Value) -> Result<Value, SignalingError>;

    /// Send a fire-and-forget notification.
    async fn notify(&self, method: &str, payload: Value) -> Result<(), SignalingError>;
}

/// Inbound traffic from the channel, delivered in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A push notification from the room.
    Notification { method: String, data: Value },
    /// The channel closed.
    Closed,
}

/// Typed signaling client.
#[derive(Clone)]
pub struct Signaling {
    channel: Arc<dyn RpcChannel>,
    request_timeout: Duration,
}

impl Signaling {
    #[must_use]
    pub fn new(channel: Arc<dyn RpcChannel>, request_timeout: Duration) -> Self {
        Self {
            channel,
            request_timeout,
        }
    }

    /// Send a typed request, bounded by the request timeout.
    pub async fn request<Req, Resp>(&self, method: &str, body: &Req) -> Result<Resp, SignalingError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let payload = protocol::to_payload(body)?;
        let start = Instant::now();

        let result =
            match tokio::time::timeout(self.request_timeout, self.channel.request(method, payload))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(SignalingError::Timeout {
                    method: method.to_string(),
                }),
            };

        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.label(),
        };
        metrics::record_signaling_request(method, status, start.elapsed());

        let value = result?;
        protocol::from_payload(method, value).map_err(|e| SignalingError::InvalidResponse {
            method: method.to_string(),
            reason: e.to_string(),
        })
    }

    /// Send a typed notification.
    pub async fn notify<T>(&self, method: &str, body: &T) -> Result<(), SignalingError>
    where
        T: Serialize + Sync,
    {
        let payload = protocol::to_payload(body)?;
        debug!(target: "session.signaling", method = method, "Sending notification");
        self.channel.notify(method, payload).await
    }

    pub async fn get_router_rtp_capabilities(&self) -> Result<RtpCapabilities, SignalingError> {
        self.request(methods::GET_ROUTER_RTP_CAPABILITIES, &Value::Null)
            .await
    }

    /// Request transport parameters for `direction`.
    pub async fn create_transport(
        &self,
        direction: Direction,
    ) -> Result<TransportOptions, SignalingError> {
        let method = match direction {
            Direction::Send => methods::CREATE_PRODUCER_TRANSPORT,
            Direction::Receive => methods::CREATE_CONSUMER_TRANSPORT,
        };
        self.request(method, &Value::Null).await
    }

    /// Forward the connect handshake for `direction`.
    pub async fn connect_transport(
        &self,
        direction: Direction,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), SignalingError> {
        let method = match direction {
            Direction::Send => methods::CONNECT_PRODUCER_TRANSPORT,
            Direction::Receive => methods::CONNECT_CONSUMER_TRANSPORT,
        };
        let _: Value = self
            .request(method, &ConnectTransportRequest { dtls_parameters })
            .await?;
        Ok(())
    }

    pub async fn produce(
        &self,
        transport_id: TransportId,
        kind: MediaKind,
        rtp_parameters: Value,
    ) -> Result<ProducerId, SignalingError> {
        let response: ProduceResponse = self
            .request(
                methods::PRODUCE,
                &ProduceRequest {
                    transport_id,
                    kind,
                    rtp_parameters,
                },
            )
            .await?;
        Ok(response.id)
    }

    pub async fn consume(&self, peer_id: PeerId) -> Result<ConsumeResponse, SignalingError> {
        self.request(methods::CONSUME, &ConsumeRequest { peer_id })
            .await
    }

    pub async fn join(&self, request: JoinRequest) -> Result<JoinResponse, SignalingError> {
        self.request(methods::JOIN, &request).await
    }

    /// Ask the room to resume a (possibly paused) server-side consumer.
    pub async fn resume_consumer(&self, consumer_id: ConsumerId) -> Result<(), SignalingError> {
        self.notify(methods::RESUME_CONSUMER, &ResumeConsumerRequest { consumer_id })
            .await
    }

    pub async fn media_state_changed(
        &self,
        kind: MediaKind,
        enabled: bool,
    ) -> Result<(), SignalingError> {
        self.notify(methods::MEDIA_STATE_CHANGED, &MediaStateChange { kind, enabled })
            .await
    }

    pub async fn ping(&self) -> Result<(), SignalingError> {
        self.notify(methods::PING, &Ping {}).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Channel that answers every request with a fixed value and records traffic.
    struct FixedChannel {
        response: Result<Value, SignalingError>,
        delay: Duration,
        sent: Mutex<Vec<(String, Value)>>,
    }

    impl FixedChannel {
        fn new(response: Result<Value, SignalingError>) -> Self {
            Self {
                response,
                delay: Duration::ZERO,
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RpcChannel for FixedChannel {
        async fn request(&self, method: &str, payload: Value) -> Result<Value, SignalingError> {
            self.sent
                .lock()
                .unwrap()
                .push((method.to_string(), payload));
            tokio::time::sleep(self.delay).await;
            self.response.clone()
        }

        async fn notify(&self, method: &str, payload: Value) -> Result<(), SignalingError> {
            self.sent
                .lock()
                .unwrap()
                .push((method.to_string(), payload));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_create_transport_uses_direction_method() {
        let channel = Arc::new(FixedChannel::new(Ok(json!({"id": "t1"}))));
        let signaling = Signaling::new(channel.clone(), Duration::from_secs(1));

        let options = signaling.create_transport(Direction::Receive).await.unwrap();
        assert_eq!(options.id.as_str(), "t1");
        assert_eq!(
            channel.sent.lock().unwrap()[0].0,
            methods::CREATE_CONSUMER_TRANSPORT
        );
    }

    #[tokio::test]
    async fn test_consume_sends_peer_id() {
        let channel = Arc::new(FixedChannel::new(Ok(json!({"consumerDetailsArray": []}))));
        let signaling = Signaling::new(channel.clone(), Duration::from_secs(1));

        let response = signaling.consume(PeerId::from("peer-a")).await.unwrap();
        assert!(response.consumer_details_array.is_empty());
        assert_eq!(
            channel.sent.lock().unwrap()[0].1,
            json!({"peerId": "peer-a"})
        );
    }

    #[tokio::test]
    async fn test_invalid_response_names_method() {
        let channel = Arc::new(FixedChannel::new(Ok(json!({"unexpected": true}))));
        let signaling = Signaling::new(channel, Duration::from_secs(1));

        let err = signaling
            .produce(TransportId::from("t1"), MediaKind::Audio, Value::Null)
            .await
            .unwrap_err();
        assert!(
            matches!(err, SignalingError::InvalidResponse { ref method, .. } if method == "produce")
        );
    }

    #[tokio::test]
    async fn test_rejection_is_propagated() {
        let channel = Arc::new(FixedChannel::new(Err(SignalingError::Rejected {
            method: "join".to_string(),
            reason: "Room is full".to_string(),
        })));
        let signaling = Signaling::new(channel, Duration::from_secs(1));

        let err = signaling
            .join(JoinRequest {
                rtp_capabilities: RtpCapabilities::default(),
                display_name: "Alice".to_string(),
                room_id: "default-room".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SignalingError::Rejected { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout() {
        let mut channel = FixedChannel::new(Ok(json!({})));
        channel.delay = Duration::from_secs(60);
        let signaling = Signaling::new(Arc::new(channel), Duration::from_secs(10));

        let err = signaling.get_router_rtp_capabilities().await.unwrap_err();
        assert_eq!(
            err,
            SignalingError::Timeout {
                method: methods::GET_ROUTER_RTP_CAPABILITIES.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_media_state_changed_payload() {
        let channel = Arc::new(FixedChannel::new(Ok(Value::Null)));
        let signaling = Signaling::new(channel.clone(), Duration::from_secs(1));

        signaling
            .media_state_changed(MediaKind::Video, false)
            .await
            .unwrap();
        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent[0].0, methods::MEDIA_STATE_CHANGED);
        assert_eq!(sent[0].1, json!({"type": "video", "enabled": false}));
    }
}

//! Mock signaling channel.
//!
//! `MockChannel` answers requests from per-method handlers and records
//! every request and notification. Unless overridden, it answers the whole
//! setup sequence successfully (happy path). `ChannelRemote` pushes room
//! notifications and close events into a session.
//!
//! # Example
//!
//! ```rust,ignore
//! use session_test_utils::{MockChannel, ChannelRemote};
//!
//! let channel = MockChannel::builder()
//!     .consume_tracks("peer-b", &[MediaKind::Video])
//!     .reject("join", "room is full")
//!     .build();
//! let (remote, events) = ChannelRemote::new();
//! ```

use async_trait::async_trait;
use common::protocol::{
    default_media_codecs, methods, ConsumeRequest, ConsumeResponse, ConsumerDetails,
    DtlsParameters, JoinResponse, ProduceResponse, RtpCapabilities, ServerNotification,
    TransportOptions,
};
use common::types::{ConsumerId, MediaKind, PeerId, ProducerId, TransportId};
use media_session::errors::SignalingError;
use media_session::signaling::{ChannelEvent, RpcChannel};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Peer id returned by the default `join` handler.
pub const LOCAL_PEER_ID: &str = "local-peer";

type Handler = Arc<dyn Fn(Value) -> Result<Value, SignalingError> + Send + Sync>;

/// Scripted signaling channel.
pub struct MockChannel {
    handlers: HashMap<String, Handler>,
    failing_notifications: HashSet<String>,
    stalled_notifications: HashSet<String>,
    requests: Mutex<Vec<(String, Value)>>,
    notifications: Mutex<Vec<(String, Value)>>,
}

impl MockChannel {
    /// Create a new MockChannel builder with happy-path handlers.
    #[must_use]
    pub fn builder() -> MockChannelBuilder {
        MockChannelBuilder::default()
    }

    /// Every request, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }

    /// Payloads of every request for `method`.
    #[must_use]
    pub fn requests_for(&self, method: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Request methods in call order.
    #[must_use]
    pub fn request_methods(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }

    /// Payloads of every notification for `method` (failed sends included).
    #[must_use]
    pub fn notifications_for(&self, method: &str) -> Vec<Value> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, v)| v.clone())
            .collect()
    }

    #[must_use]
    pub fn notification_count(&self, method: &str) -> usize {
        self.notifications_for(method).len()
    }
}

#[async_trait]
impl RpcChannel for MockChannel {
    async fn request(&self, method: &str, payload: Value) -> Result<Value, SignalingError> {
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), payload.clone()));

        match self.handlers.get(method) {
            Some(handler) => handler(payload),
            None => Err(SignalingError::Rejected {
                method: method.to_string(),
                reason: "no handler".to_string(),
            }),
        }
    }

    async fn notify(&self, method: &str, payload: Value) -> Result<(), SignalingError> {
        self.notifications
            .lock()
            .unwrap()
            .push((method.to_string(), payload));

        if self.stalled_notifications.contains(method) {
            std::future::pending::<()>().await;
        }
        if self.failing_notifications.contains(method) {
            return Err(SignalingError::ChannelClosed);
        }
        Ok(())
    }
}

/// Builder for MockChannel configuration.
pub struct MockChannelBuilder {
    handlers: HashMap<String, Handler>,
    failing_notifications: HashSet<String>,
    stalled_notifications: HashSet<String>,
    consumable: HashMap<PeerId, Vec<MediaKind>>,
}

impl Default for MockChannelBuilder {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            failing_notifications: HashSet::new(),
            stalled_notifications: HashSet::new(),
            consumable: HashMap::new(),
        }
        .respond(
            methods::GET_ROUTER_RTP_CAPABILITIES,
            serde_json::to_value(RtpCapabilities {
                codecs: default_media_codecs(),
                header_extensions: Vec::new(),
            })
            .unwrap(),
        )
        .handler(methods::CREATE_PRODUCER_TRANSPORT, |_| {
            Ok(transport_options())
        })
        .handler(methods::CREATE_CONSUMER_TRANSPORT, |_| {
            Ok(transport_options())
        })
        .respond(methods::CONNECT_PRODUCER_TRANSPORT, json!({}))
        .respond(methods::CONNECT_CONSUMER_TRANSPORT, json!({}))
        .handler(methods::PRODUCE, |_| {
            Ok(serde_json::to_value(ProduceResponse {
                id: ProducerId::new(),
            })
            .unwrap())
        })
        .respond(
            methods::JOIN,
            serde_json::to_value(JoinResponse {
                peer_id: Some(PeerId::from(LOCAL_PEER_ID)),
            })
            .unwrap(),
        )
    }
}

impl MockChannelBuilder {
    /// Answer `method` with a fixed value.
    #[must_use]
    pub fn respond(self, method: &str, value: Value) -> Self {
        self.handler(method, move |_| Ok(value.clone()))
    }

    /// Reject `method`.
    #[must_use]
    pub fn reject(self, method: &str, reason: &str) -> Self {
        let method_name = method.to_string();
        let reason = reason.to_string();
        self.handler(method, move |_| {
            Err(SignalingError::Rejected {
                method: method_name.clone(),
                reason: reason.clone(),
            })
        })
    }

    /// Answer `method` with a closure.
    #[must_use]
    pub fn handler<F>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(Value) -> Result<Value, SignalingError> + Send + Sync + 'static,
    {
        self.handlers.insert(method.to_string(), Arc::new(handler));
        self
    }

    /// Make `consume` for `peer_id` return one fresh track per kind.
    #[must_use]
    pub fn consume_tracks(mut self, peer_id: &str, kinds: &[MediaKind]) -> Self {
        self.consumable
            .insert(PeerId::from(peer_id), kinds.to_vec());
        self
    }

    /// Make every notification for `method` fail.
    #[must_use]
    pub fn fail_notifications(mut self, method: &str) -> Self {
        self.failing_notifications.insert(method.to_string());
        self
    }

    /// Make every notification for `method` hang, as on a congested link.
    #[must_use]
    pub fn stall_notifications(mut self, method: &str) -> Self {
        self.stalled_notifications.insert(method.to_string());
        self
    }

    /// Build the channel.
    #[must_use]
    pub fn build(mut self) -> Arc<MockChannel> {
        if !self.handlers.contains_key(methods::CONSUME) {
            let consumable = self.consumable.clone();
            self = self.handler(methods::CONSUME, move |payload| {
                let request: ConsumeRequest = serde_json::from_value(payload).map_err(|e| {
                    SignalingError::InvalidResponse {
                        method: methods::CONSUME.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                let kinds = consumable.get(&request.peer_id).cloned().unwrap_or_default();
                let details = kinds
                    .into_iter()
                    .map(|kind| ConsumerDetails {
                        id: ConsumerId::new(),
                        producer_id: ProducerId::new(),
                        kind,
                        rtp_parameters: json!({}),
                    })
                    .collect();
                Ok(serde_json::to_value(ConsumeResponse {
                    consumer_details_array: details,
                })
                .unwrap())
            });
        }

        Arc::new(MockChannel {
            handlers: self.handlers,
            failing_notifications: self.failing_notifications,
            stalled_notifications: self.stalled_notifications,
            requests: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
        })
    }
}

fn transport_options() -> Value {
    serde_json::to_value(TransportOptions {
        id: TransportId::new(),
        ice_parameters: json!({"usernameFragment": "mock", "password": "mock"}),
        ice_candidates: json!([]),
        dtls_parameters: DtlsParameters::default(),
        sctp_parameters: None,
    })
    .unwrap()
}

/// Room side of a mock channel: pushes notifications and close events.
#[derive(Clone)]
pub struct ChannelRemote {
    sender: mpsc::Sender<ChannelEvent>,
}

impl ChannelRemote {
    /// Create a remote and the event receiver handed to the session.
    #[must_use]
    pub fn new() -> (Self, mpsc::Receiver<ChannelEvent>) {
        let (sender, receiver) = mpsc::channel(64);
        (Self { sender }, receiver)
    }

    /// Push a typed room notification.
    pub async fn notify(&self, notification: ServerNotification) {
        let data = notification.to_payload().unwrap();
        self.raw(notification.method(), data).await;
    }

    /// Push an arbitrary `(method, data)` pair.
    pub async fn raw(&self, method: &str, data: Value) {
        self.sender
            .send(ChannelEvent::Notification {
                method: method.to_string(),
                data,
            })
            .await
            .unwrap();
    }

    /// Signal that the channel closed.
    pub async fn close(&self) {
        let _ = self.sender.send(ChannelEvent::Closed).await;
    }
}

//! Signaling protocol shared by the media session client and the room service.
//!
//! Every request and notification travels as `(method, payload)` where the
//! payload is a JSON object with camelCase keys. Requests are answered with
//! a JSON result; notifications are fire-and-forget.
//!
//! | Method | Direction | Kind |
//! |--------|-----------|------|
//! | `getRouterRtpCapabilities` | client → room | request |
//! | `createProducerTransport` / `createConsumerTransport` | client → room | request |
//! | `connectProducerTransport` / `connectConsumerTransport` | client → room | request |
//! | `produce` / `consume` / `join` | client → room | request |
//! | `resumeConsumer` / `mediaStateChanged` / `ping` | client → room | notify |
//! | `peerJoined` / `peerLeft` / `setAvailablePeers` / `peerMediaStateChanged` | room → client | notify |

use crate::error::ProtocolError;
use crate::types::{ConsumerId, MediaKind, PeerId, ProducerId, TransportId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Method names.
pub mod methods {
    pub const GET_ROUTER_RTP_CAPABILITIES: &str = "getRouterRtpCapabilities";
    pub const CREATE_PRODUCER_TRANSPORT: &str = "createProducerTransport";
    pub const CONNECT_PRODUCER_TRANSPORT: &str = "connectProducerTransport";
    pub const PRODUCE: &str = "produce";
    pub const CREATE_CONSUMER_TRANSPORT: &str = "createConsumerTransport";
    pub const CONNECT_CONSUMER_TRANSPORT: &str = "connectConsumerTransport";
    pub const CONSUME: &str = "consume";
    pub const RESUME_CONSUMER: &str = "resumeConsumer";
    pub const JOIN: &str = "join";
    pub const MEDIA_STATE_CHANGED: &str = "mediaStateChanged";
    pub const PING: &str = "ping";

    pub const PEER_JOINED: &str = "peerJoined";
    pub const PEER_LEFT: &str = "peerLeft";
    pub const SET_AVAILABLE_PEERS: &str = "setAvailablePeers";
    pub const PEER_MEDIA_STATE_CHANGED: &str = "peerMediaStateChanged";
}

// ----------------------------------------------------------------------------
// Capabilities
// ----------------------------------------------------------------------------

/// A codec the router (or a device) can handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecCapability {
    pub kind: MediaKind,
    pub mime_type: String,
    #[serde(default, alias = "payloadType", skip_serializing_if = "Option::is_none")]
    pub preferred_payload_type: Option<u8>,
    pub clock_rate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
}

/// Routing capabilities negotiated at session start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCapabilities {
    #[serde(default)]
    pub codecs: Vec<RtpCodecCapability>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub header_extensions: Vec<Value>,
}

impl RtpCapabilities {
    /// Whether at least one codec of `kind` is present.
    #[must_use]
    pub fn supports(&self, kind: MediaKind) -> bool {
        self.codecs.iter().any(|c| c.kind == kind)
    }

    /// Whether the capability set carries no codecs at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

/// Default router codec set: Opus for audio, VP8 for video.
#[must_use]
pub fn default_media_codecs() -> Vec<RtpCodecCapability> {
    let mut vp8_parameters = Map::new();
    vp8_parameters.insert("x-google-start-bitrate".to_string(), Value::from(1000));

    vec![
        RtpCodecCapability {
            kind: MediaKind::Audio,
            mime_type: "audio/opus".to_string(),
            preferred_payload_type: Some(100),
            clock_rate: 48_000,
            channels: Some(2),
            parameters: Map::new(),
        },
        RtpCodecCapability {
            kind: MediaKind::Video,
            mime_type: "video/VP8".to_string(),
            preferred_payload_type: Some(101),
            clock_rate: 90_000,
            channels: None,
            parameters: vp8_parameters,
        },
    ]
}

// ----------------------------------------------------------------------------
// Transports
// ----------------------------------------------------------------------------

/// A DTLS certificate fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtlsFingerprint {
    pub algorithm: String,
    pub value: String,
}

/// DTLS parameters exchanged during the transport connect handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtlsParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub fingerprints: Vec<DtlsFingerprint>,
}

/// Transport-level parameters handed out by the routing engine.
///
/// ICE parameters and candidates are opaque to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportOptions {
    pub id: TransportId,
    #[serde(default)]
    pub ice_parameters: Value,
    #[serde(default)]
    pub ice_candidates: Value,
    #[serde(default)]
    pub dtls_parameters: DtlsParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sctp_parameters: Option<Value>,
}

/// `connectProducerTransport` / `connectConsumerTransport` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTransportRequest {
    pub dtls_parameters: DtlsParameters,
}

// ----------------------------------------------------------------------------
// Produce / consume
// ----------------------------------------------------------------------------

/// `produce` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProduceRequest {
    pub transport_id: TransportId,
    pub kind: MediaKind,
    #[serde(default)]
    pub rtp_parameters: Value,
}

/// `produce` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceResponse {
    pub id: ProducerId,
}

/// `consume` request: consume every producer of `peer_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    pub peer_id: PeerId,
}

/// One consumable track descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerDetails {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    #[serde(default)]
    pub rtp_parameters: Value,
}

/// `consume` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeResponse {
    #[serde(default)]
    pub consumer_details_array: Vec<ConsumerDetails>,
}

/// `resumeConsumer` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeConsumerRequest {
    pub consumer_id: ConsumerId,
}

// ----------------------------------------------------------------------------
// Room membership
// ----------------------------------------------------------------------------

/// `join` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub rtp_capabilities: RtpCapabilities,
    pub display_name: String,
    pub room_id: String,
}

/// `join` response. Rooms that assign identifiers return the joiner's id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<PeerId>,
}

/// `mediaStateChanged` notification from a participant about its own media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaStateChange {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub enabled: bool,
}

/// `ping` notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {}

fn enabled_by_default() -> bool {
    true
}

/// A remote participant as announced by the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerDetails {
    pub id: PeerId,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "enabled_by_default")]
    pub audio_enabled: bool,
    #[serde(default = "enabled_by_default")]
    pub video_enabled: bool,
}

/// `peerLeft` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerLeft {
    pub id: PeerId,
}

/// `setAvailablePeers` notification: full roster snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailablePeers {
    #[serde(default)]
    pub other_peer_details: Vec<PeerDetails>,
}

/// `peerMediaStateChanged` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerMediaStateChanged {
    pub peer_id: PeerId,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub enabled: bool,
}

/// Notifications pushed by the room to a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerNotification {
    PeerJoined(PeerDetails),
    PeerLeft(PeerLeft),
    SetAvailablePeers(AvailablePeers),
    PeerMediaStateChanged(PeerMediaStateChanged),
}

impl ServerNotification {
    /// Wire method name.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            ServerNotification::PeerJoined(_) => methods::PEER_JOINED,
            ServerNotification::PeerLeft(_) => methods::PEER_LEFT,
            ServerNotification::SetAvailablePeers(_) => methods::SET_AVAILABLE_PEERS,
            ServerNotification::PeerMediaStateChanged(_) => methods::PEER_MEDIA_STATE_CHANGED,
        }
    }

    /// Decode an inbound `(method, data)` pair.
    ///
    /// # Errors
    ///
    /// `UnknownMethod` for methods without a handler, `InvalidPayload` when
    /// the data does not match the method's shape.
    pub fn parse(method: &str, data: Value) -> Result<Self, ProtocolError> {
        match method {
            methods::PEER_JOINED => from_payload(method, data).map(Self::PeerJoined),
            methods::PEER_LEFT => from_payload(method, data).map(Self::PeerLeft),
            methods::SET_AVAILABLE_PEERS => {
                from_payload(method, data).map(Self::SetAvailablePeers)
            }
            methods::PEER_MEDIA_STATE_CHANGED => {
                from_payload(method, data).map(Self::PeerMediaStateChanged)
            }
            other => Err(ProtocolError::UnknownMethod(other.to_string())),
        }
    }

    /// Encode into a wire payload.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the payload cannot be encoded.
    pub fn to_payload(&self) -> Result<Value, ProtocolError> {
        match self {
            ServerNotification::PeerJoined(p) => to_payload(p),
            ServerNotification::PeerLeft(p) => to_payload(p),
            ServerNotification::SetAvailablePeers(p) => to_payload(p),
            ServerNotification::PeerMediaStateChanged(p) => to_payload(p),
        }
    }
}

/// Serialize a payload struct.
///
/// # Errors
///
/// Returns `Serialization` if the value cannot be represented as JSON.
pub fn to_payload<T: Serialize>(value: &T) -> Result<Value, ProtocolError> {
    serde_json::to_value(value).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Deserialize a payload struct for `method`.
///
/// A `null` payload is treated as an empty object so methods without
/// arguments decode into their default shape.
///
/// # Errors
///
/// Returns `InvalidPayload` naming the method on shape mismatch.
pub fn from_payload<T: DeserializeOwned>(method: &str, data: Value) -> Result<T, ProtocolError> {
    let data = if data.is_null() {
        Value::Object(Map::new())
    } else {
        data
    };
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_peer_joined_defaults_flags() {
        let n = ServerNotification::parse(
            methods::PEER_JOINED,
            json!({"id": "p1", "displayName": "Alice"}),
        )
        .unwrap();
        match n {
            ServerNotification::PeerJoined(p) => {
                assert_eq!(p.id.as_str(), "p1");
                assert_eq!(p.display_name, "Alice");
                assert!(p.audio_enabled);
                assert!(p.video_enabled);
            }
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[test]
    fn test_parse_available_peers() {
        let n = ServerNotification::parse(
            methods::SET_AVAILABLE_PEERS,
            json!({"otherPeerDetails": [
                {"id": "a", "displayName": "A"},
                {"id": "b", "displayName": "B", "videoEnabled": false}
            ]}),
        )
        .unwrap();
        let ServerNotification::SetAvailablePeers(peers) = n else {
            panic!("expected roster snapshot");
        };
        assert_eq!(peers.other_peer_details.len(), 2);
        assert!(!peers.other_peer_details[1].video_enabled);
    }

    #[test]
    fn test_parse_media_state_uses_type_key() {
        let n = ServerNotification::parse(
            methods::PEER_MEDIA_STATE_CHANGED,
            json!({"peerId": "a", "type": "video", "enabled": false}),
        )
        .unwrap();
        assert_eq!(
            n,
            ServerNotification::PeerMediaStateChanged(PeerMediaStateChanged {
                peer_id: PeerId::from("a"),
                kind: MediaKind::Video,
                enabled: false,
            })
        );
    }

    #[test]
    fn test_unknown_method_is_reported() {
        let err = ServerNotification::parse("chat", json!({})).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownMethod("chat".to_string()));
    }

    #[test]
    fn test_invalid_payload_names_method() {
        let err = ServerNotification::parse(methods::PEER_LEFT, json!({"nope": 1})).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { method, .. } if method == "peerLeft"));
    }

    #[test]
    fn test_media_state_change_wire_shape() {
        let v = to_payload(&MediaStateChange {
            kind: MediaKind::Video,
            enabled: false,
        })
        .unwrap();
        assert_eq!(v, json!({"type": "video", "enabled": false}));
    }

    #[test]
    fn test_codec_accepts_payload_type_alias() {
        let codec: RtpCodecCapability = serde_json::from_value(json!({
            "kind": "audio",
            "mimeType": "audio/opus",
            "payloadType": 100,
            "clockRate": 48000,
            "channels": 2
        }))
        .unwrap();
        assert_eq!(codec.preferred_payload_type, Some(100));
    }

    #[test]
    fn test_default_codecs_cover_both_kinds() {
        let caps = RtpCapabilities {
            codecs: default_media_codecs(),
            header_extensions: Vec::new(),
        };
        assert!(caps.supports(MediaKind::Audio));
        assert!(caps.supports(MediaKind::Video));
        assert!(!RtpCapabilities::default().supports(MediaKind::Audio));
    }

    #[test]
    fn test_null_payload_decodes_as_empty_object() {
        let ping: Ping = from_payload(methods::PING, Value::Null).unwrap();
        assert_eq!(ping, Ping {});
        let resp: JoinResponse = from_payload(methods::JOIN, Value::Null).unwrap();
        assert!(resp.peer_id.is_none());
    }
}

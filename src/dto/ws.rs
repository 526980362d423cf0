use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

/// Messages accepted from a call-room WebSocket peer.
///
/// The envelope is `{type, data}`. Signaling payloads are opaque and
/// forwarded verbatim; unrecognized types land on the `Unknown` arm so the
/// dispatch match stays exhaustive.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "type", content = "data")]
pub enum RoomInboundMessage {
    /// WebRTC offer to forward to the peer.
    #[serde(rename = "offer")]
    Offer(Value),
    /// WebRTC answer to forward to the peer.
    #[serde(rename = "answer")]
    Answer(Value),
    /// ICE candidate to forward to the peer.
    #[serde(rename = "ice_candidate")]
    IceCandidate(Value),
    /// Chat message to persist and broadcast.
    #[serde(rename = "chat_message")]
    ChatMessage {
        /// Raw message content.
        content: String,
    },
    /// Any message type this protocol does not know.
    #[serde(other)]
    Unknown,
}

impl RoomInboundMessage {
    /// Parse a raw frame into a call-room message.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Messages accepted from a matching-room WebSocket peer.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "type", content = "data")]
pub enum MatchingInboundMessage {
    /// Announce that the sender's waiting call is open for matches.
    #[serde(rename = "looking_for_match")]
    LookingForMatch {
        /// The sender's waiting call.
        call_id: Uuid,
    },
    /// Relay a match announcement to the room.
    #[serde(rename = "match_found")]
    MatchFound {
        /// The bound call.
        call_id: Uuid,
        /// Both sides of the binding.
        matched_users: Vec<Uuid>,
    },
    /// Any message type this protocol does not know.
    #[serde(other)]
    Unknown,
}

impl MatchingInboundMessage {
    /// Parse a raw frame into a matching-room message.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Machine-readable reasons carried by relay `error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolErrorReason {
    /// The `type` field named a message this protocol does not know.
    UnknownMessageType,
    /// The frame was not valid JSON or its payload did not fit the type.
    InvalidFormat,
    /// The connection targeted a call id the store does not know.
    CallNotFound,
    /// The connecting user is not a participant of the targeted call.
    Unauthorized,
}

/// Chat payload broadcast to a room, enriched with sender metadata.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChatBroadcast {
    /// Raw message content.
    pub content: String,
    /// Display handle of the sender.
    pub sender: String,
    /// Server-assigned RFC 3339 timestamp.
    pub timestamp: String,
}

/// Handshake payload confirming a room join.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectionEstablished {
    /// The joined room: a call id, or `"matching"` for the global room.
    pub room: String,
    /// Echo of the authenticated identity behind the connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
}

/// Looking-for-match announcement fanned out to the matching room.
#[derive(Debug, Serialize, ToSchema)]
pub struct LookingAnnouncement {
    /// The announcer's waiting call.
    pub call_id: Uuid,
    /// The announcing user, when the connection is authenticated.
    pub user_id: Option<Uuid>,
    /// Display handle of the announcer.
    pub handle: String,
}

/// Match announcement fanned out to the matching room.
#[derive(Debug, Serialize, ToSchema)]
pub struct MatchAnnouncement {
    /// The bound call.
    pub call_id: Uuid,
    /// Both sides of the binding.
    pub matched_users: Vec<Uuid>,
}

/// Messages the relay pushes to WebSocket peers.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    /// Forwarded WebRTC offer, tagged with the sender.
    #[serde(rename = "offer")]
    Offer {
        /// Opaque signaling payload.
        #[schema(value_type = Object)]
        data: Value,
        /// The sending peer.
        user_id: Uuid,
    },
    /// Forwarded WebRTC answer, tagged with the sender.
    #[serde(rename = "answer")]
    Answer {
        /// Opaque signaling payload.
        #[schema(value_type = Object)]
        data: Value,
        /// The sending peer.
        user_id: Uuid,
    },
    /// Forwarded ICE candidate, tagged with the sender.
    #[serde(rename = "ice_candidate")]
    IceCandidate {
        /// Opaque signaling payload.
        #[schema(value_type = Object)]
        data: Value,
        /// The sending peer.
        user_id: Uuid,
    },
    /// Chat message broadcast to the whole room.
    #[serde(rename = "chat_message")]
    ChatMessage {
        /// Enriched chat payload.
        data: ChatBroadcast,
        /// The sending peer.
        user_id: Uuid,
    },
    /// Looking-for-match announcement on the matching room.
    #[serde(rename = "looking_for_match")]
    LookingForMatch {
        /// Announcement payload.
        data: LookingAnnouncement,
    },
    /// Match announcement on the matching room.
    #[serde(rename = "match_found")]
    MatchFound {
        /// Announcement payload.
        data: MatchAnnouncement,
    },
    /// Join handshake sent to the connecting client.
    #[serde(rename = "connection_established")]
    ConnectionEstablished {
        /// Handshake payload.
        data: ConnectionEstablished,
    },
    /// Protocol error reported back on the offending connection.
    #[serde(rename = "error")]
    Error {
        /// Machine-readable reason.
        reason: ProtocolErrorReason,
    },
}

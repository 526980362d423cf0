use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::call::CallStatusView;

#[derive(Clone, Debug)]
/// Dispatched payload carried across the SSE channels.
pub struct ServerEvent {
    /// Optional SSE event name.
    pub event: Option<String>,
    /// Serialized JSON data field.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream (`events` or `matches`).
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the matchmaking engine binds two calls together.
pub struct MatchFoundEvent {
    /// The requester's bound call.
    pub call_id: Uuid,
    /// Both sides of the binding.
    pub matched_users: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a call reaches a terminal status.
pub struct CallTerminatedEvent {
    /// The terminated call.
    pub call_id: Uuid,
    /// Terminal status the call reached.
    pub status: CallStatusView,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a user starts advertising for a match.
pub struct LookingEvent {
    /// The advertising user.
    pub user_id: Uuid,
    /// Display handle of the user.
    pub handle: String,
}

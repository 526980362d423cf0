use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        self,
        validation::validate_chat_content,
        ws::{
            ChatBroadcast, ConnectionEstablished, LookingAnnouncement, MatchAnnouncement,
            MatchingInboundMessage, OutboundMessage, ProtocolErrorReason, RoomInboundMessage,
        },
    },
    state::{
        SharedState,
        messages::StoredMessage,
        rooms::{RoomId, RoomMember},
    },
};

/// Writer channel closed - the connection should be terminated.
#[derive(Debug, Error)]
#[error("connection closed")]
struct ConnectionClosed;

/// Handle the full lifecycle for a call-room WebSocket connection.
///
/// The connection is validated against the call record before joining the
/// room; signaling frames are forwarded to the other room members, chat
/// frames are persisted and fanned out to everyone, and protocol violations
/// are answered on the same connection without closing it. Cleanup (room
/// leave + presence offline) runs on every exit path of the receive loop.
pub async fn handle_call_socket(state: SharedState, socket: WebSocket, call_id: Uuid, user: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let rejection = match state.calls().get(call_id) {
        None => Some(ProtocolErrorReason::CallNotFound),
        Some(call) if call.initiator != user && call.participant != Some(user) => {
            Some(ProtocolErrorReason::Unauthorized)
        }
        Some(_) => None,
    };
    if let Some(reason) = rejection {
        warn!(%call_id, %user, ?reason, "rejecting call room join");
        let _ = send_message(&outbound_tx, &OutboundMessage::Error { reason });
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    }

    let conn_id = Uuid::new_v4();
    let room = RoomId::Call(call_id);
    state.rooms().join(
        room,
        RoomMember {
            conn_id,
            user: Some(user),
            tx: outbound_tx.clone(),
        },
    );
    state.presence().set_online(user, "");
    info!(%call_id, %user, "peer joined call room");

    let _ = send_message(
        &outbound_tx,
        &OutboundMessage::ConnectionEstablished {
            data: ConnectionEstablished {
                room: call_id.to_string(),
                user_id: Some(user),
            },
        },
    );

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_room_frame(&state, room, conn_id, call_id, user, &text, &outbound_tx);
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%call_id, %user, "peer closed call connection");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%call_id, %user, error = %err, "websocket error");
                break;
            }
        }
    }

    // Cleanup runs on every exit path of the receive loop above.
    state.rooms().leave(room, conn_id);
    state.presence().set_offline(user);
    info!(%call_id, %user, "peer left call room");

    finalize(writer_task, outbound_tx).await;
}

/// Dispatch a single text frame received on a call room connection.
fn handle_room_frame(
    state: &SharedState,
    room: RoomId,
    conn_id: Uuid,
    call_id: Uuid,
    user: Uuid,
    text: &str,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) {
    let inbound = match RoomInboundMessage::from_json_str(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(%call_id, %user, error = %err, "malformed relay frame");
            let _ = send_message(
                outbound_tx,
                &OutboundMessage::Error {
                    reason: ProtocolErrorReason::InvalidFormat,
                },
            );
            return;
        }
    };

    match inbound {
        RoomInboundMessage::Offer(payload) => {
            forward_to_room(
                state,
                room,
                Some(conn_id),
                &OutboundMessage::Offer {
                    data: payload,
                    user_id: user,
                },
            );
        }
        RoomInboundMessage::Answer(payload) => {
            forward_to_room(
                state,
                room,
                Some(conn_id),
                &OutboundMessage::Answer {
                    data: payload,
                    user_id: user,
                },
            );
        }
        RoomInboundMessage::IceCandidate(payload) => {
            forward_to_room(
                state,
                room,
                Some(conn_id),
                &OutboundMessage::IceCandidate {
                    data: payload,
                    user_id: user,
                },
            );
        }
        RoomInboundMessage::ChatMessage { content } => {
            if let Err(err) = validate_chat_content(&content, state.config().chat_max_chars()) {
                warn!(%call_id, %user, error = %err, "rejected chat content");
                let _ = send_message(
                    outbound_tx,
                    &OutboundMessage::Error {
                        reason: ProtocolErrorReason::InvalidFormat,
                    },
                );
                return;
            }

            let handle = state
                .presence()
                .get(user)
                .map(|record| record.handle)
                .unwrap_or_else(|| "anonymous".to_string());
            let now = OffsetDateTime::now_utc();

            state.messages().append(
                call_id,
                StoredMessage {
                    sender: user,
                    handle: handle.clone(),
                    content: content.clone(),
                    timestamp: now,
                },
            );

            // Chat goes to the whole room, sender included, with metadata.
            forward_to_room(
                state,
                room,
                None,
                &OutboundMessage::ChatMessage {
                    data: ChatBroadcast {
                        content,
                        sender: handle,
                        timestamp: dto::format_timestamp(now),
                    },
                    user_id: user,
                },
            );
        }
        RoomInboundMessage::Unknown => {
            warn!(%call_id, %user, "unknown relay message type");
            let _ = send_message(
                outbound_tx,
                &OutboundMessage::Error {
                    reason: ProtocolErrorReason::UnknownMessageType,
                },
            );
        }
    }
}

/// Handle the full lifecycle for a matching-room WebSocket connection.
///
/// The matching room carries out-of-band availability announcements only;
/// anonymous connections are accepted since nothing here is call-scoped.
pub async fn handle_matching_socket(state: SharedState, socket: WebSocket, user: Option<Uuid>) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let conn_id = Uuid::new_v4();
    state.rooms().join(
        RoomId::Matching,
        RoomMember {
            conn_id,
            user,
            tx: outbound_tx.clone(),
        },
    );
    info!(?user, "peer joined matching room");

    let _ = send_message(
        &outbound_tx,
        &OutboundMessage::ConnectionEstablished {
            data: ConnectionEstablished {
                room: "matching".to_string(),
                user_id: user,
            },
        },
    );

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_matching_frame(&state, conn_id, user, &text, &outbound_tx);
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(?user, error = %err, "websocket error");
                break;
            }
        }
    }

    state.rooms().leave(RoomId::Matching, conn_id);
    info!(?user, "peer left matching room");

    finalize(writer_task, outbound_tx).await;
}

/// Dispatch a single text frame received on the matching room connection.
fn handle_matching_frame(
    state: &SharedState,
    _conn_id: Uuid,
    user: Option<Uuid>,
    text: &str,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) {
    let inbound = match MatchingInboundMessage::from_json_str(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(?user, error = %err, "malformed matching frame");
            let _ = send_message(
                outbound_tx,
                &OutboundMessage::Error {
                    reason: ProtocolErrorReason::InvalidFormat,
                },
            );
            return;
        }
    };

    match inbound {
        MatchingInboundMessage::LookingForMatch { call_id } => {
            let handle = user
                .and_then(|id| state.presence().get(id))
                .map(|record| record.handle)
                .unwrap_or_else(|| "anonymous".to_string());
            if let Some(id) = user {
                state.presence().touch(id);
            }

            // Announcements reach every matching room member, sender included.
            forward_to_room(
                state,
                RoomId::Matching,
                None,
                &OutboundMessage::LookingForMatch {
                    data: LookingAnnouncement {
                        call_id,
                        user_id: user,
                        handle,
                    },
                },
            );
        }
        MatchingInboundMessage::MatchFound {
            call_id,
            matched_users,
        } => {
            forward_to_room(
                state,
                RoomId::Matching,
                None,
                &OutboundMessage::MatchFound {
                    data: MatchAnnouncement {
                        call_id,
                        matched_users,
                    },
                },
            );
        }
        MatchingInboundMessage::Unknown => {
            warn!(?user, "unknown matching message type");
            let _ = send_message(
                outbound_tx,
                &OutboundMessage::Error {
                    reason: ProtocolErrorReason::UnknownMessageType,
                },
            );
        }
    }
}

/// Serialize a payload and fan it out to a room, optionally excluding the sender.
fn forward_to_room(
    state: &SharedState,
    room: RoomId,
    exclude: Option<Uuid>,
    message: &OutboundMessage,
) {
    match serde_json::to_string(message) {
        Ok(frame) => {
            state.rooms().broadcast(room, &frame, exclude);
        }
        Err(err) => {
            // Serialization failure is a permanent error (bug in code).
            warn!(error = %err, "failed to serialize relay message `{message:?}`");
        }
    }
}

/// Serialize a payload and push it onto the provided connection's writer.
///
/// Returns `Err(ConnectionClosed)` when the writer channel is gone, which
/// means the connection is being torn down.
fn send_message<T>(tx: &mpsc::UnboundedSender<Message>, value: &T) -> Result<(), ConnectionClosed>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}` (permanent error)");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde::Serialize;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{
        events::{CallTerminatedEvent, Handshake, LookingEvent, MatchFoundEvent, ServerEvent},
        ws::{MatchAnnouncement, OutboundMessage},
    },
    state::{SharedState, calls::CallStatus, rooms::RoomId},
};

const EVENT_MATCH_FOUND: &str = "match.found";
const EVENT_CALL_ENDED: &str = "call.ended";
const EVENT_CALL_SKIPPED: &str = "call.skipped";
const EVENT_USER_LOOKING: &str = "user.looking";

/// Announce a fresh binding everywhere interested parties listen: the shared
/// event hub, both users' watch channels, and the global matching room.
pub fn broadcast_match_found(state: &SharedState, call_id: Uuid, matched_users: [Uuid; 2]) {
    let payload = MatchFoundEvent {
        call_id,
        matched_users: matched_users.to_vec(),
    };
    send_event(state, EVENT_MATCH_FOUND, &payload);

    if let Ok(event) = ServerEvent::json(Some(EVENT_MATCH_FOUND.to_string()), &payload) {
        for user in matched_users {
            state.match_watch().notify(user, event.clone());
        }
    }

    let announcement = OutboundMessage::MatchFound {
        data: MatchAnnouncement {
            call_id,
            matched_users: matched_users.to_vec(),
        },
    };
    match serde_json::to_string(&announcement) {
        Ok(frame) => {
            state.rooms().broadcast(RoomId::Matching, &frame, None);
        }
        Err(err) => warn!(error = %err, "failed to serialize match announcement"),
    }
}

/// Broadcast that a call reached a terminal status.
pub fn broadcast_call_terminated(state: &SharedState, call_id: Uuid, status: CallStatus) {
    let name = match status {
        CallStatus::Skipped => EVENT_CALL_SKIPPED,
        _ => EVENT_CALL_ENDED,
    };
    let payload = CallTerminatedEvent {
        call_id,
        status: status.into(),
    };
    send_event(state, name, &payload);
}

/// Broadcast that a user started advertising for a match.
pub fn broadcast_user_looking(state: &SharedState, user_id: Uuid, handle: &str) {
    let payload = LookingEvent {
        user_id,
        handle: handle.to_string(),
    };
    send_event(state, EVENT_USER_LOOKING, &payload);
}

fn send_event<T: Serialize>(state: &SharedState, name: &str, payload: &T) {
    match ServerEvent::json(Some(name.to_string()), payload) {
        Ok(event) => state.events().broadcast(event),
        Err(err) => warn!(event = name, error = %err, "failed to serialize event"),
    }
}

/// Subscribe to the shared event stream.
pub fn subscribe_events(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.events().subscribe()
}

/// Convert a broadcast receiver into an SSE response, forwarding events until
/// the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: reads from broadcast and pushes into mpsc
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            let mut event = Event::default().data(payload.data);
                            if let Some(name) = payload.event {
                                event = event.event(name);
                            }

                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {
                            // Skip lagged messages but keep the stream alive.
                            continue;
                        }
                    }
                }
            }
        }

        tracing::info!("event SSE stream disconnected");
    });

    // response stream reads from mpsc; when the client disconnects axum drops it
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Stream match notifications addressed to a single user.
///
/// The first event is a handshake confirming the subscription; afterwards
/// every notification delivered to the user's watch channel is forwarded.
pub fn match_stream(
    state: &SharedState,
    user: Uuid,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    let mut receiver = state.match_watch().subscribe(user);

    let stream = async_stream::stream! {
        let handshake = Handshake {
            stream: "matches".to_string(),
            message: format!("watching matches for {user}"),
        };
        if let Ok(event) = ServerEvent::json(Some("handshake".to_string()), &handshake) {
            yield Ok(server_event_to_sse(event));
        }

        loop {
            match receiver.recv().await {
                Ok(payload) => yield Ok(server_event_to_sse(payload)),
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(_)) => continue,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn server_event_to_sse(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

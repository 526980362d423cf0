use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{services::events, state::SharedState};

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/events", get(event_stream))
        .route("/sse/matches/{user}", get(match_stream))
}

#[utoipa::path(
    get,
    path = "/sse/events",
    tag = "sse",
    responses((status = 200, description = "Shared event stream", content_type = "text/event-stream", body = String))
)]
/// Stream match and call lifecycle events to any subscriber.
pub async fn event_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = events::subscribe_events(&state);
    info!("new event SSE connection");
    events::to_sse_stream(receiver)
}

#[utoipa::path(
    get,
    path = "/sse/matches/{user}",
    tag = "sse",
    params(("user" = String, Path, description = "User whose match notifications to stream")),
    responses((status = 200, description = "Per-user match stream", content_type = "text/event-stream", body = String))
)]
/// Stream match notifications addressed to a single user.
pub async fn match_stream(
    State(state): State<SharedState>,
    Path(user): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    info!(%user, "new match watch SSE connection");
    events::match_stream(&state, user)
}

use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{services::relay_service, state::SharedState};

/// Query parameters carrying the connecting identity.
///
/// Browsers cannot attach headers to WebSocket upgrades, so the validated
/// user id travels as a query parameter on this surface.
#[derive(Debug, Deserialize)]
pub struct SocketIdentity {
    /// Authenticated user behind the connection.
    pub user: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/ws/calls/{id}",
    tag = "relay",
    params(
        ("id" = String, Path, description = "Call id scoping the relay room"),
        ("user" = String, Query, description = "Authenticated user id")
    ),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a call-room relay session.
pub async fn call_ws_handler(
    State(state): State<SharedState>,
    Path(call_id): Path<Uuid>,
    Query(identity): Query<SocketIdentity>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let shared_state = state.clone();
    // An unidentified peer gets the unauthorized notice inside the socket, so
    // the failure is reported on the connection instead of a silent 4xx.
    let user = identity.user.unwrap_or_else(Uuid::nil);
    ws.on_upgrade(move |socket| {
        relay_service::handle_call_socket(shared_state.clone(), socket, call_id, user)
    })
}

#[utoipa::path(
    get,
    path = "/ws/matching",
    tag = "relay",
    params(("user" = String, Query, description = "Authenticated user id (optional)")),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a matching-room session.
pub async fn matching_ws_handler(
    State(state): State<SharedState>,
    Query(identity): Query<SocketIdentity>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let shared_state = state.clone();
    ws.on_upgrade(move |socket| {
        relay_service::handle_matching_socket(shared_state.clone(), socket, identity.user)
    })
}

/// Configure the WebSocket endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/ws/calls/{id}", get(call_ws_handler))
        .route("/ws/matching", get(matching_ws_handler))
}

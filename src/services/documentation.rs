use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Quickpair Back.
#[openapi(
    paths(
        crate::routes::presence::bring_online,
        crate::routes::presence::take_offline,
        crate::routes::presence::set_looking,
        crate::routes::presence::list_online,
        crate::routes::calls::create_call,
        crate::routes::calls::find_match,
        crate::routes::calls::skip_call,
        crate::routes::calls::end_call,
        crate::routes::calls::logout,
        crate::routes::events::event_stream,
        crate::routes::events::match_stream,
        crate::routes::websocket::call_ws_handler,
        crate::routes::websocket::matching_ws_handler,
    ),
    components(
        schemas(
            crate::dto::call::PresenceHello,
            crate::dto::call::LookingRequest,
            crate::dto::call::UserSummary,
            crate::dto::call::CallSummary,
            crate::dto::call::CallStatusView,
            crate::dto::call::MatchResponse,
            crate::dto::call::AckResponse,
            crate::dto::ws::RoomInboundMessage,
            crate::dto::ws::MatchingInboundMessage,
            crate::dto::ws::OutboundMessage,
            crate::dto::ws::ProtocolErrorReason,
            crate::dto::events::Handshake,
            crate::dto::events::MatchFoundEvent,
            crate::services::matchmaking::MatchTier,
        )
    ),
    tags(
        (name = "presence", description = "User presence registry"),
        (name = "calls", description = "Call lifecycle and matchmaking"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "relay", description = "WebSocket signaling relay"),
    )
)]
pub struct ApiDoc;

/// Call lifecycle operations: create, skip, end, logout.
pub mod call_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Event broadcasting and SSE stream plumbing.
pub mod events;
/// Tiered matchmaking search and atomic pair binding.
pub mod matchmaking;
/// WebSocket connection and message relay service.
pub mod relay_service;

use axum::{Router, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{error::AppError, state::SharedState};

pub mod calls;
pub mod docs;
pub mod events;
pub mod presence;
pub mod websocket;

/// Header through which the external auth collaborator hands in the caller id.
const IDENTITY_HEADER: &str = "x-user-id";

/// Validated caller identity extracted from the request headers.
///
/// Account creation and token validation live outside the core; by the time a
/// request reaches these routes the identity is assumed to be authenticated,
/// and this extractor only parses it.
pub struct Identity(pub Uuid);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(IDENTITY_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                reason: "unauthorized",
                message: format!("missing {IDENTITY_HEADER} header"),
            })?;

        let id = value.parse::<Uuid>().map_err(|_| AppError::Unauthorized {
            reason: "unauthorized",
            message: format!("malformed {IDENTITY_HEADER} header"),
        })?;

        Ok(Identity(id))
    }
}

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = presence::router()
        .merge(calls::router())
        .merge(events::router())
        .merge(websocket::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}

use axum::{Json, Router, extract::State, routing::post};
use validator::Validate;

use crate::{
    dto::call::{LookingRequest, PresenceHello, UserSummary},
    error::AppError,
    routes::Identity,
    state::SharedState,
};

/// Routes handling the user presence registry.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/presence/online", post(bring_online).get(list_online))
        .route("/presence/offline", post(take_offline))
        .route("/presence/looking", post(set_looking))
}

/// Bring the caller online, registering the record on first sight.
#[utoipa::path(
    post,
    path = "/presence/online",
    tag = "presence",
    request_body = PresenceHello,
    responses(
        (status = 200, description = "User is online", body = UserSummary)
    )
)]
pub async fn bring_online(
    State(state): State<SharedState>,
    Identity(user): Identity,
    Json(payload): Json<PresenceHello>,
) -> Result<Json<UserSummary>, AppError> {
    payload.validate()?;

    state.presence().set_online(user, &payload.handle);
    let record = state.presence().get(user).ok_or(AppError::Internal {
        reason: "internal",
        message: "presence record vanished after registration".into(),
    })?;

    Ok(Json(record.into()))
}

/// Mark the caller offline.
#[utoipa::path(
    post,
    path = "/presence/offline",
    tag = "presence",
    responses(
        (status = 200, description = "User is offline", body = UserSummary)
    )
)]
pub async fn take_offline(
    State(state): State<SharedState>,
    Identity(user): Identity,
) -> Result<Json<UserSummary>, AppError> {
    if !state.presence().set_offline(user) {
        return Err(AppError::NotFound {
            reason: "unknown_user",
            message: format!("unknown user `{user}`"),
        });
    }

    let record = state.presence().get(user).ok_or(AppError::Internal {
        reason: "internal",
        message: "presence record vanished after update".into(),
    })?;

    Ok(Json(record.into()))
}

/// Toggle whether the caller is actively advertising for a match.
#[utoipa::path(
    post,
    path = "/presence/looking",
    tag = "presence",
    request_body = LookingRequest,
    responses(
        (status = 200, description = "Flag updated", body = UserSummary)
    )
)]
pub async fn set_looking(
    State(state): State<SharedState>,
    Identity(user): Identity,
    Json(payload): Json<LookingRequest>,
) -> Result<Json<UserSummary>, AppError> {
    if !state.presence().mark_looking(user, payload.looking) {
        return Err(AppError::NotFound {
            reason: "unknown_user",
            message: format!("unknown user `{user}`"),
        });
    }

    let record = state.presence().get(user).ok_or(AppError::Internal {
        reason: "internal",
        message: "presence record vanished after update".into(),
    })?;

    Ok(Json(record.into()))
}

/// List all users currently online.
#[utoipa::path(
    get,
    path = "/presence/online",
    tag = "presence",
    responses(
        (status = 200, description = "Online users", body = [UserSummary])
    )
)]
pub async fn list_online(State(state): State<SharedState>) -> Json<Vec<UserSummary>> {
    let users = state
        .presence()
        .online_users()
        .into_iter()
        .map(UserSummary::from)
        .collect();
    Json(users)
}

use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::call::{AckResponse, CallSummary, MatchResponse},
    error::AppError,
    routes::Identity,
    services::{call_service, matchmaking},
    state::SharedState,
};

/// Routes handling call lifecycle operations and matchmaking.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/calls", post(create_call))
        .route("/calls/match", post(find_match))
        .route("/calls/skip", post(skip_call))
        .route("/calls/end", post(end_call))
        .route("/logout", post(logout))
}

/// Open a fresh waiting call for the caller.
#[utoipa::path(
    post,
    path = "/calls",
    tag = "calls",
    responses(
        (status = 200, description = "Call created", body = CallSummary),
        (status = 409, description = "Caller already holds a call")
    )
)]
pub async fn create_call(
    State(state): State<SharedState>,
    Identity(user): Identity,
) -> Result<Json<CallSummary>, AppError> {
    let summary = call_service::create_call(&state, user).await?;
    Ok(Json(summary))
}

/// Search the tiers for a counterpart and bind the pair on success.
#[utoipa::path(
    post,
    path = "/calls/match",
    tag = "calls",
    responses(
        (status = 200, description = "Match outcome (no-match is a normal result)", body = MatchResponse),
        (status = 400, description = "Caller holds no waiting call")
    )
)]
pub async fn find_match(
    State(state): State<SharedState>,
    Identity(user): Identity,
) -> Result<Json<MatchResponse>, AppError> {
    let response = matchmaking::find_match(&state, user).await?;
    Ok(Json(response))
}

/// Skip the caller's current call.
#[utoipa::path(
    post,
    path = "/calls/skip",
    tag = "calls",
    responses(
        (status = 200, description = "Call skipped", body = AckResponse),
        (status = 400, description = "Caller holds no call")
    )
)]
pub async fn skip_call(
    State(state): State<SharedState>,
    Identity(user): Identity,
) -> Result<Json<AckResponse>, AppError> {
    let ack = call_service::skip(&state, user).await?;
    Ok(Json(ack))
}

/// End the caller's current call.
#[utoipa::path(
    post,
    path = "/calls/end",
    tag = "calls",
    responses(
        (status = 200, description = "Call ended", body = AckResponse),
        (status = 400, description = "Caller holds no call")
    )
)]
pub async fn end_call(
    State(state): State<SharedState>,
    Identity(user): Identity,
) -> Result<Json<AckResponse>, AppError> {
    let ack = call_service::end(&state, user).await?;
    Ok(Json(ack))
}

/// End any current call and take the caller offline.
#[utoipa::path(
    post,
    path = "/logout",
    tag = "calls",
    responses(
        (status = 200, description = "Logged out", body = AckResponse)
    )
)]
pub async fn logout(
    State(state): State<SharedState>,
    Identity(user): Identity,
) -> Result<Json<AckResponse>, AppError> {
    let ack = call_service::logout(&state, user).await?;
    Ok(Json(ack))
}

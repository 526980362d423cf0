use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::{
    dto::call::{AckResponse, CallSummary},
    error::ServiceError,
    services::events,
    state::{SharedState, calls::Termination},
};

/// Open a fresh waiting call for `user` and advertise them as seeking.
///
/// Fails with `AlreadyInCall` while the user holds a non-terminal call.
pub async fn create_call(state: &SharedState, user: Uuid) -> Result<CallSummary, ServiceError> {
    let _gate = state.pairing_gate().lock().await;

    let record = state
        .presence()
        .get(user)
        .ok_or(ServiceError::UnknownUser(user))?;
    if record.current_call.is_some() {
        return Err(ServiceError::AlreadyInCall);
    }

    let now = OffsetDateTime::now_utc();
    let call = state.calls().create(user, now);
    state.presence().apply(user, |record| {
        record.current_call = Some(call.id);
        record.looking_for_call = true;
        record.last_seen = now;
    });

    info!(%user, call = %call.id, "created waiting call");
    events::broadcast_user_looking(state, user, &record.handle);

    Ok(call.into())
}

/// Skip the user's current call; the pairing dissolves as a non-connection.
pub async fn skip(state: &SharedState, user: Uuid) -> Result<AckResponse, ServiceError> {
    terminate(state, user, Termination::Skipped).await?;
    Ok(AckResponse::skipped())
}

/// End the user's current call, computing its duration.
pub async fn end(state: &SharedState, user: Uuid) -> Result<AckResponse, ServiceError> {
    terminate(state, user, Termination::Ended).await?;
    Ok(AckResponse::ended())
}

/// End any current call, then take the user offline.
pub async fn logout(state: &SharedState, user: Uuid) -> Result<AckResponse, ServiceError> {
    if state.presence().get(user).is_none() {
        return Err(ServiceError::UnknownUser(user));
    }

    match terminate(state, user, Termination::Ended).await {
        Ok(()) | Err(ServiceError::NoActiveCall) => {}
        Err(err) => return Err(err),
    }
    state.presence().set_offline(user);

    info!(%user, "user logged out");
    Ok(AckResponse::logged_out())
}

/// Terminate the user's current call and its participant's mirror.
///
/// Both calls transition to the same terminal status with the same
/// timestamp, and both users' pairing fields are cleared. With no current
/// call this returns `NoActiveCall` without mutating anything.
async fn terminate(
    state: &SharedState,
    user: Uuid,
    kind: Termination,
) -> Result<(), ServiceError> {
    let _gate = state.pairing_gate().lock().await;

    let record = state
        .presence()
        .get(user)
        .ok_or(ServiceError::UnknownUser(user))?;
    let call_id = record.current_call.ok_or(ServiceError::NoActiveCall)?;
    let call = state
        .calls()
        .get(call_id)
        .ok_or(ServiceError::CallNotFound(call_id))?;

    let now = OffsetDateTime::now_utc();
    state
        .calls()
        .apply(call_id, |record| record.terminate(kind, now))
        .ok_or(ServiceError::CallNotFound(call_id))?
        .map_err(ServiceError::from)?;

    if let Some(partner) = call.participant
        && let Some(partner_record) = state.presence().get(partner)
    {
        if let Some(mirror_id) = partner_record.current_call {
            state.calls().apply(mirror_id, |record| {
                if !record.status.is_terminal() {
                    let _ = record.terminate(kind, now);
                }
            });
            events::broadcast_call_terminated(state, mirror_id, kind.status());
        }
        state.presence().apply(partner, |record| {
            record.current_call = None;
            record.looking_for_call = false;
            record.last_seen = now;
        });
    }

    state.presence().apply(user, |record| {
        record.current_call = None;
        record.looking_for_call = false;
        record.last_seen = now;
    });

    info!(%user, call = %call_id, ?kind, "terminated call");
    events::broadcast_call_terminated(state, call_id, kind.status());

    Ok(())
}

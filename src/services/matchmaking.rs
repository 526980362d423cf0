use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::call::MatchResponse,
    error::ServiceError,
    services::events,
    state::{
        SharedState,
        calls::{CallStatus, Termination},
        presence::UserRecord,
    },
};

/// Priority bucket in the matchmaking fallback search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Users actively advertising with a waiting call of their own.
    Seeking,
    /// Users active within the recent window, idle, with no call.
    RecentlyActive,
    /// Any online user, preempting their current call if needed.
    AnyOnline,
}

/// Candidate picked by the tier search, carrying the snapshot it was read from.
#[derive(Debug, Clone)]
struct Candidate {
    record: UserRecord,
    tier: MatchTier,
}

/// Why a bind attempt did not produce a pairing.
#[derive(Debug, Error)]
enum BindError {
    /// Candidate availability changed since the snapshot; retry the tiers.
    #[error("candidate availability changed during bind")]
    Conflict,
    /// The requester itself is no longer eligible; propagate to the caller.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Find and bind a counterpart for `user`, who must own a waiting call.
///
/// Tier evaluation reads presence snapshots without locks; the bind runs
/// under the pairing gate and compare-and-sets the candidate's version. A
/// lost race restarts the tier evaluation from scratch, bounded by the
/// configured attempt count, after which the engine reports no match.
pub async fn find_match(state: &SharedState, user: Uuid) -> Result<MatchResponse, ServiceError> {
    let requester = state
        .presence()
        .get(user)
        .ok_or(ServiceError::UnknownUser(user))?;
    let call_id = requester.current_call.ok_or(ServiceError::NoActiveCall)?;
    let waiting = state
        .calls()
        .get(call_id)
        .is_some_and(|call| call.status == CallStatus::Waiting);
    if !waiting {
        return Err(ServiceError::NoActiveCall);
    }

    for attempt in 0..state.config().match_attempts() {
        let Some(candidate) = select_candidate(state, user).await else {
            info!(%user, "no candidates available in any tier");
            return Ok(MatchResponse::no_match());
        };

        match bind(state, user, call_id, &candidate).await {
            Ok(response) => return Ok(response),
            Err(BindError::Conflict) => {
                debug!(
                    %user,
                    candidate = %candidate.record.id,
                    attempt,
                    "lost bind race; re-evaluating tiers"
                );
            }
            Err(BindError::Service(err)) => return Err(err),
        }
    }

    info!(%user, "bind attempts exhausted; reporting no match");
    Ok(MatchResponse::no_match())
}

/// Evaluate the tiers in order and pick a candidate from the first non-empty one.
async fn select_candidate(state: &SharedState, user: Uuid) -> Option<Candidate> {
    let presence = state.presence();

    // Tier 1: actively seeking users holding a call of their own. The pick is
    // deterministic (earliest registration wins) so retries are reproducible.
    let mut seeking: Vec<UserRecord> = presence
        .looking_users()
        .into_iter()
        .filter(|record| record.id != user && record.current_call.is_some())
        .collect();
    if !seeking.is_empty() {
        seeking.sort_by_key(|record| record.seq);
        return Some(Candidate {
            record: seeking.swap_remove(0),
            tier: MatchTier::Seeking,
        });
    }

    // Tier 2: recently active idle users without a call, picked at random.
    // Candidates are ordered by registration before the draw so a seeded
    // generator reproduces the same pick.
    let mut recent: Vec<UserRecord> = presence
        .recently_active(state.config().recent_activity_window())
        .into_iter()
        .filter(|record| {
            record.id != user && !record.looking_for_call && record.current_call.is_none()
        })
        .collect();
    if !recent.is_empty() {
        recent.sort_by_key(|record| record.seq);
        let index = state.pick_index(recent.len()).await;
        return Some(Candidate {
            record: recent.swap_remove(index),
            tier: MatchTier::RecentlyActive,
        });
    }

    // Tier 3: any online user, regardless of call state.
    let mut online: Vec<UserRecord> = presence
        .online_users()
        .into_iter()
        .filter(|record| record.id != user)
        .collect();
    if !online.is_empty() {
        online.sort_by_key(|record| record.seq);
        let index = state.pick_index(online.len()).await;
        return Some(Candidate {
            record: online.swap_remove(index),
            tier: MatchTier::AnyOnline,
        });
    }

    None
}

/// Bind the requester's call to the candidate under the pairing gate.
///
/// The candidate's record version must still match the snapshot the tier
/// search read; any interleaved mutation fails the attempt with `Conflict`
/// and no state is touched.
async fn bind(
    state: &SharedState,
    user: Uuid,
    user_call_id: Uuid,
    candidate: &Candidate,
) -> Result<MatchResponse, BindError> {
    let _gate = state.pairing_gate().lock().await;

    // The requester may have been preempted or terminated while we searched.
    let requester = state
        .presence()
        .get(user)
        .ok_or(ServiceError::UnknownUser(user))?;
    if requester.current_call != Some(user_call_id) {
        return Err(ServiceError::NoActiveCall.into());
    }
    let still_waiting = state
        .calls()
        .get(user_call_id)
        .is_some_and(|call| call.status == CallStatus::Waiting);
    if !still_waiting {
        return Err(ServiceError::NoActiveCall.into());
    }

    // Compare-and-set read: any mutation since the snapshot fails the bind.
    let current_version = state
        .presence()
        .version_of(candidate.record.id)
        .ok_or(BindError::Conflict)?;
    if current_version != candidate.record.version {
        return Err(BindError::Conflict);
    }

    let now = OffsetDateTime::now_utc();
    let counterpart_call_id = match candidate.tier {
        MatchTier::Seeking => {
            let existing = candidate.record.current_call.ok_or(BindError::Conflict)?;
            let waiting = state
                .calls()
                .get(existing)
                .is_some_and(|call| call.status == CallStatus::Waiting);
            if !waiting {
                return Err(BindError::Conflict);
            }
            existing
        }
        MatchTier::RecentlyActive => state.calls().create(candidate.record.id, now).id,
        MatchTier::AnyOnline => {
            if let Some(existing) = candidate.record.current_call {
                preempt(state, existing, now);
            }
            state.calls().create(candidate.record.id, now).id
        }
    };

    // Both calls activate with the same timestamp and reference each other.
    state
        .calls()
        .apply(user_call_id, |call| call.activate(candidate.record.id, now))
        .ok_or(ServiceError::CallNotFound(user_call_id))
        .map_err(BindError::Service)?
        .map_err(ServiceError::from)?;
    state
        .calls()
        .apply(counterpart_call_id, |call| call.activate(user, now))
        .ok_or(ServiceError::CallNotFound(counterpart_call_id))
        .map_err(BindError::Service)?
        .map_err(ServiceError::from)?;

    state.presence().apply(user, |record| {
        record.current_call = Some(user_call_id);
        record.looking_for_call = false;
        record.last_seen = now;
    });
    state.presence().apply(candidate.record.id, |record| {
        record.current_call = Some(counterpart_call_id);
        record.looking_for_call = false;
        record.last_seen = now;
    });

    info!(
        %user,
        counterpart = %candidate.record.id,
        tier = ?candidate.tier,
        call = %user_call_id,
        "bound call pair"
    );

    let bound_call = state
        .calls()
        .get(user_call_id)
        .ok_or(ServiceError::CallNotFound(user_call_id))?;
    let counterpart = state
        .presence()
        .get(candidate.record.id)
        .ok_or(ServiceError::UnknownUser(candidate.record.id))?;

    events::broadcast_match_found(state, user_call_id, [user, candidate.record.id]);

    Ok(MatchResponse {
        matched: true,
        call: Some(bound_call.into()),
        counterpart: Some(counterpart.into()),
        tier: Some(candidate.tier),
    })
}

/// Forcibly end a bystander's call so its owner becomes available (Tier 3).
///
/// When the preempted call has an established participant, the mirrored call
/// is ended too and that participant's fields are cleared, so nobody is left
/// referencing a terminal call. Must be called with the pairing gate held.
fn preempt(state: &SharedState, call_id: Uuid, now: OffsetDateTime) {
    let Some(call) = state.calls().get(call_id) else {
        return;
    };
    if call.status.is_terminal() {
        return;
    }

    state.calls().apply(call_id, |record| {
        let _ = record.terminate(Termination::Ended, now);
    });
    info!(call = %call_id, "preempted call for tier-3 match");

    if let Some(partner) = call.participant
        && let Some(partner_record) = state.presence().get(partner)
    {
        if let Some(mirror_id) = partner_record.current_call {
            state.calls().apply(mirror_id, |record| {
                if !record.status.is_terminal() {
                    let _ = record.terminate(Termination::Ended, now);
                }
            });
            events::broadcast_call_terminated(state, mirror_id, CallStatus::Ended);
        }
        state.presence().apply(partner, |record| {
            record.current_call = None;
            record.looking_for_call = false;
        });
    }

    events::broadcast_call_terminated(state, call_id, CallStatus::Ended);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        services::call_service,
        state::{AppState, calls::CallStatus},
    };

    fn seeded_state() -> SharedState {
        AppState::with_seeded_rng(AppConfig::default(), 7)
    }

    fn register(state: &SharedState, handle: &str) -> Uuid {
        let id = Uuid::new_v4();
        state.presence().set_online(id, handle);
        id
    }

    async fn open_call(state: &SharedState, user: Uuid) -> Uuid {
        call_service::create_call(state, user).await.unwrap().id
    }

    #[tokio::test]
    async fn seeking_users_match_first_and_deterministically() {
        let state = seeded_state();
        let a = register(&state, "a");
        let b = register(&state, "b");
        let c = register(&state, "c");

        let a_call = open_call(&state, a).await;
        let b_call = open_call(&state, b).await;
        open_call(&state, c).await;

        let response = find_match(&state, a).await.unwrap();
        assert!(response.matched);
        assert_eq!(response.tier, Some(MatchTier::Seeking));
        // b registered before c, so the stable order picks b.
        assert_eq!(response.counterpart.as_ref().unwrap().id, b);

        let bound_a = state.calls().get(a_call).unwrap();
        let bound_b = state.calls().get(b_call).unwrap();
        assert_eq!(bound_a.status, CallStatus::Active);
        assert_eq!(bound_b.status, CallStatus::Active);
        assert_eq!(bound_a.participant, Some(b));
        assert_eq!(bound_b.participant, Some(a));
        assert_eq!(bound_a.started_at, bound_b.started_at);

        for user in [a, b] {
            let record = state.presence().get(user).unwrap();
            assert!(!record.looking_for_call);
            assert!(record.current_call.is_some());
        }
    }

    #[tokio::test]
    async fn empty_tiers_report_no_match_without_side_effects() {
        let state = seeded_state();
        let a = register(&state, "a");
        let a_call = open_call(&state, a).await;
        let before = state.presence().get(a).unwrap();

        let response = find_match(&state, a).await.unwrap();

        assert!(!response.matched);
        assert!(response.call.is_none());
        let after = state.presence().get(a).unwrap();
        assert_eq!(after.current_call, Some(a_call));
        assert_eq!(after.looking_for_call, before.looking_for_call);
        assert_eq!(state.calls().get(a_call).unwrap().status, CallStatus::Waiting);
    }

    #[tokio::test]
    async fn recently_active_users_get_a_fresh_call() {
        let state = seeded_state();
        let a = register(&state, "a");
        let b = register(&state, "b");
        let a_call = open_call(&state, a).await;

        let response = find_match(&state, a).await.unwrap();

        assert!(response.matched);
        assert_eq!(response.tier, Some(MatchTier::RecentlyActive));
        assert_eq!(response.counterpart.as_ref().unwrap().id, b);

        let b_record = state.presence().get(b).unwrap();
        let b_call = state.calls().get(b_record.current_call.unwrap()).unwrap();
        assert_eq!(b_call.initiator, b);
        assert_eq!(b_call.status, CallStatus::Active);
        assert_eq!(b_call.participant, Some(a));
        assert_eq!(state.calls().get(a_call).unwrap().participant, Some(b));
    }

    #[tokio::test]
    async fn stale_users_are_reachable_through_the_last_tier() {
        let state = seeded_state();
        let a = register(&state, "a");
        let b = register(&state, "b");
        state.presence().apply(b, |record| {
            record.last_seen = OffsetDateTime::now_utc() - time::Duration::minutes(30);
        });
        open_call(&state, a).await;

        let response = find_match(&state, a).await.unwrap();

        assert!(response.matched);
        assert_eq!(response.tier, Some(MatchTier::AnyOnline));
        assert_eq!(response.counterpart.as_ref().unwrap().id, b);
    }

    #[tokio::test]
    async fn preemption_replaces_an_active_pairing() {
        let state = seeded_state();
        let c = register(&state, "c");
        let d = register(&state, "d");
        let c_call = open_call(&state, c).await;
        open_call(&state, d).await;
        let bound = find_match(&state, c).await.unwrap();
        assert!(bound.matched);
        let d_call = state.presence().get(d).unwrap().current_call.unwrap();

        // Only c remains reachable; d goes offline but keeps its bound call.
        state.presence().set_offline(d);

        let e = register(&state, "e");
        let e_call = open_call(&state, e).await;
        let response = find_match(&state, e).await.unwrap();

        assert!(response.matched);
        assert_eq!(response.tier, Some(MatchTier::AnyOnline));
        assert_eq!(response.counterpart.as_ref().unwrap().id, c);

        // c's previous call ended, replaced by a fresh binding with e.
        let preempted = state.calls().get(c_call).unwrap();
        assert_eq!(preempted.status, CallStatus::Ended);
        assert!(preempted.ended_at.is_some());

        // d's mirrored call ended independently and d's slots were cleared.
        let mirror = state.calls().get(d_call).unwrap();
        assert_eq!(mirror.status, CallStatus::Ended);
        assert!(state.presence().get(d).unwrap().current_call.is_none());

        let fresh = state.presence().get(c).unwrap().current_call.unwrap();
        assert_ne!(fresh, c_call);
        assert_eq!(state.calls().get(fresh).unwrap().participant, Some(e));
        assert_eq!(state.calls().get(e_call).unwrap().participant, Some(c));
    }

    #[tokio::test]
    async fn find_match_requires_a_waiting_call() {
        let state = seeded_state();
        let a = register(&state, "a");

        let err = find_match(&state, a).await.unwrap_err();
        assert!(matches!(err, ServiceError::NoActiveCall));

        let unknown = find_match(&state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(unknown, ServiceError::UnknownUser(_)));
    }

    #[tokio::test]
    async fn random_tiers_are_reproducible_with_a_seed() {
        let mut picks = Vec::new();
        for _ in 0..2 {
            let state = AppState::with_seeded_rng(AppConfig::default(), 42);
            let a = register(&state, "a");
            register(&state, "b");
            register(&state, "c");
            register(&state, "d");
            open_call(&state, a).await;

            let response = find_match(&state, a).await.unwrap();
            picks.push(response.counterpart.unwrap().handle);
        }
        assert_eq!(picks[0], picks[1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn contended_candidate_is_bound_exactly_once() {
        let state = seeded_state();
        let target = register(&state, "target");
        open_call(&state, target).await;

        let requesters: Vec<Uuid> = (0..4).map(|i| register(&state, &format!("r{i}"))).collect();
        for user in &requesters {
            open_call(&state, *user).await;
        }

        let mut handles = Vec::new();
        for user in requesters.clone() {
            let state = state.clone();
            handles.push(tokio::spawn(
                async move { find_match(&state, user).await },
            ));
        }

        // Exactly one requester may win the contested tier-1 candidate. The
        // losers observe the updated state and fall through to other tiers,
        // report no match, or lose their own call to tier-3 preemption.
        let mut seeking_wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(response) => {
                    if response.tier == Some(MatchTier::Seeking)
                        && response.counterpart.as_ref().map(|c| c.id) == Some(target)
                    {
                        seeking_wins += 1;
                    }
                }
                Err(ServiceError::NoActiveCall) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(seeking_wins, 1);

        // Global invariants: every current call is non-terminal, and active
        // pairings reference each other symmetrically.
        let mut everyone = requesters.clone();
        everyone.push(target);
        for user in everyone {
            let record = state.presence().get(user).unwrap();
            let Some(call_id) = record.current_call else {
                continue;
            };
            let call = state.calls().get(call_id).unwrap();
            assert!(!call.status.is_terminal());
            if call.status == CallStatus::Active {
                let partner = call.participant.expect("active call must have a participant");
                let partner_call_id = state
                    .presence()
                    .get(partner)
                    .unwrap()
                    .current_call
                    .expect("partner of an active call must hold a call");
                let partner_call = state.calls().get(partner_call_id).unwrap();
                assert_eq!(partner_call.participant, Some(user));
            }
        }
    }
}

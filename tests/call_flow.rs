//! End-to-end flow over the service layer: presence, matching, termination.

use quickpair_back::{
    config::AppConfig,
    services::{call_service, matchmaking, matchmaking::MatchTier},
    state::{AppState, SharedState, calls::CallStatus},
};
use uuid::Uuid;

fn seeded_state() -> SharedState {
    AppState::with_seeded_rng(AppConfig::default(), 5)
}

fn register(state: &SharedState, handle: &str) -> Uuid {
    let id = Uuid::new_v4();
    state.presence().set_online(id, handle);
    id
}

#[tokio::test]
async fn full_call_flow_from_presence_to_termination() {
    let state = seeded_state();

    let alice = register(&state, "alice");
    let bob = register(&state, "bob");

    // Both open waiting calls; creating one advertises the owner as seeking.
    let alice_call = call_service::create_call(&state, alice).await.unwrap().id;
    let bob_call = call_service::create_call(&state, bob).await.unwrap().id;

    // Listeners attached before the match observe its announcement.
    let mut hub_rx = state.events().subscribe();
    let mut bob_watch = state.match_watch().subscribe(bob);

    let response = matchmaking::find_match(&state, alice).await.unwrap();
    assert!(response.matched);
    assert_eq!(response.tier, Some(MatchTier::Seeking));

    let bound = response.call.unwrap();
    assert_eq!(bound.id, alice_call);
    assert_eq!(bound.participant, Some(bob));
    assert_eq!(response.counterpart.unwrap().id, bob);

    // Both records agree on the pairing and the start timestamp.
    let alice_record = state.calls().get(alice_call).unwrap();
    let bob_record = state.calls().get(bob_call).unwrap();
    assert_eq!(alice_record.status, CallStatus::Active);
    assert_eq!(bob_record.status, CallStatus::Active);
    assert_eq!(alice_record.participant, Some(bob));
    assert_eq!(bob_record.participant, Some(alice));
    assert_eq!(alice_record.started_at, bob_record.started_at);

    // The shared hub and bob's watch channel both carried the announcement.
    let hub_event = hub_rx.recv().await.unwrap();
    assert_eq!(hub_event.event.as_deref(), Some("match.found"));

    let watch_event = bob_watch.recv().await.unwrap();
    assert_eq!(watch_event.event.as_deref(), Some("match.found"));
    assert!(watch_event.data.contains(&alice_call.to_string()));

    // Pretend the pair talked for a while before hanging up.
    for call_id in [alice_call, bob_call] {
        state.calls().apply(call_id, |call| {
            call.started_at =
                Some(time::OffsetDateTime::now_utc() - time::Duration::seconds(25));
        });
    }
    call_service::end(&state, alice).await.unwrap();

    for call_id in [alice_call, bob_call] {
        let call = state.calls().get(call_id).unwrap();
        assert_eq!(call.status, CallStatus::Ended);
        assert_eq!(call.duration_secs, 25);
    }
    for user in [alice, bob] {
        let record = state.presence().get(user).unwrap();
        assert!(record.current_call.is_none());
        assert!(!record.looking_for_call);
    }

    // Terminal calls are retained for auditing, and both users can pair again.
    assert!(state.calls().get(alice_call).is_some());
    call_service::create_call(&state, alice).await.unwrap();
    call_service::create_call(&state, bob).await.unwrap();
    let rematch = matchmaking::find_match(&state, bob).await.unwrap();
    assert!(rematch.matched);
    assert_eq!(rematch.counterpart.unwrap().id, alice);
}

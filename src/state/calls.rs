use dashmap::DashMap;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Status of a call throughout its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    /// Created, waiting for the matchmaking engine to bind a counterpart.
    Waiting,
    /// Bound to a counterpart; signaling can flow.
    Active,
    /// Terminated normally; duration has been computed if the call started.
    Ended,
    /// Terminated by a skip; counts as a non-connection.
    Skipped,
}

impl CallStatus {
    /// Whether the status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, CallStatus::Ended | CallStatus::Skipped)
    }
}

/// How a call was closed. Skips are non-connections and keep a zero duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The call ended after a connection; duration is computed.
    Ended,
    /// One side skipped; the call never counts as connected.
    Skipped,
}

impl Termination {
    /// Terminal status this termination kind resolves to.
    pub fn status(self) -> CallStatus {
        match self {
            Termination::Ended => CallStatus::Ended,
            Termination::Skipped => CallStatus::Skipped,
        }
    }
}

/// Error returned when attempting to apply an invalid lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: call cannot move from {from:?} to {attempted:?}")]
pub struct InvalidTransition {
    /// Status the call was in when the invalid transition was requested.
    pub from: CallStatus,
    /// Status the transition attempted to reach.
    pub attempted: CallStatus,
}

/// A single call record with its pairing slots and timestamp bookkeeping.
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// Stable identifier for the call.
    pub id: Uuid,
    /// User who created the call.
    pub initiator: Uuid,
    /// Counterpart bound by the matchmaking engine, if any.
    pub participant: Option<Uuid>,
    /// Current lifecycle status.
    pub status: CallStatus,
    /// When the call record was created.
    pub created_at: OffsetDateTime,
    /// Set exactly once, at the waiting-to-active transition.
    pub started_at: Option<OffsetDateTime>,
    /// Set when the call reaches a terminal status.
    pub ended_at: Option<OffsetDateTime>,
    /// Whole seconds between start and end; zero for skips and unstarted calls.
    pub duration_secs: i64,
}

impl CallRecord {
    /// Build a fresh waiting call owned by `initiator`.
    pub fn new(initiator: Uuid, at: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            initiator,
            participant: None,
            status: CallStatus::Waiting,
            created_at: at,
            started_at: None,
            ended_at: None,
            duration_secs: 0,
        }
    }

    /// Bind `partner` and move the call from waiting to active.
    pub fn activate(&mut self, partner: Uuid, at: OffsetDateTime) -> Result<(), InvalidTransition> {
        if self.status != CallStatus::Waiting {
            return Err(InvalidTransition {
                from: self.status,
                attempted: CallStatus::Active,
            });
        }

        self.participant = Some(partner);
        self.status = CallStatus::Active;
        self.started_at = Some(at);
        Ok(())
    }

    /// Move the call into a terminal status, computing duration for ends.
    ///
    /// Ends compute `duration_secs` as whole seconds between `started_at` and
    /// `at` when the call actually started; skips and never-started calls keep
    /// zero. Terminal calls are immutable and reject further transitions.
    pub fn terminate(
        &mut self,
        kind: Termination,
        at: OffsetDateTime,
    ) -> Result<(), InvalidTransition> {
        if self.status.is_terminal() {
            return Err(InvalidTransition {
                from: self.status,
                attempted: kind.status(),
            });
        }

        self.status = kind.status();
        self.ended_at = Some(at);
        if kind == Termination::Ended
            && let Some(started) = self.started_at
        {
            self.duration_secs = (at - started).whole_seconds().max(0);
        }
        Ok(())
    }
}

/// Shared store of call records keyed by call id.
///
/// Records are retained after termination for auditing; the store never
/// deletes them. Multi-record mutations (binding, mirrored termination) are
/// serialized by the pairing gate owned by the application state.
#[derive(Debug, Default)]
pub struct CallStore {
    calls: DashMap<Uuid, CallRecord>,
}

impl CallStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a fresh waiting call, returning a snapshot of it.
    pub fn create(&self, initiator: Uuid, at: OffsetDateTime) -> CallRecord {
        let record = CallRecord::new(initiator, at);
        self.calls.insert(record.id, record.clone());
        record
    }

    /// Snapshot a call by id.
    pub fn get(&self, id: Uuid) -> Option<CallRecord> {
        self.calls.get(&id).map(|entry| entry.clone())
    }

    /// Mutate a call record in place, returning the closure's result.
    ///
    /// The entry guard is held only for the duration of the closure, so
    /// callers must not touch other store entries from inside it.
    pub fn apply<T>(&self, id: Uuid, f: impl FnOnce(&mut CallRecord) -> T) -> Option<T> {
        self.calls.get_mut(&id).map(|mut entry| f(&mut entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn now() -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    #[test]
    fn fresh_call_is_waiting_and_unbound() {
        let call = CallRecord::new(Uuid::new_v4(), now());
        assert_eq!(call.status, CallStatus::Waiting);
        assert!(call.participant.is_none());
        assert!(call.started_at.is_none());
        assert_eq!(call.duration_secs, 0);
    }

    #[test]
    fn activate_binds_partner_and_stamps_start() {
        let mut call = CallRecord::new(Uuid::new_v4(), now());
        let partner = Uuid::new_v4();
        let at = now();

        call.activate(partner, at).unwrap();

        assert_eq!(call.status, CallStatus::Active);
        assert_eq!(call.participant, Some(partner));
        assert_eq!(call.started_at, Some(at));
    }

    #[test]
    fn activate_rejected_outside_waiting() {
        let mut call = CallRecord::new(Uuid::new_v4(), now());
        call.activate(Uuid::new_v4(), now()).unwrap();

        let err = call.activate(Uuid::new_v4(), now()).unwrap_err();
        assert_eq!(err.from, CallStatus::Active);
        assert_eq!(err.attempted, CallStatus::Active);
    }

    #[test]
    fn end_computes_whole_second_duration() {
        let mut call = CallRecord::new(Uuid::new_v4(), now());
        let started = now();
        call.activate(Uuid::new_v4(), started).unwrap();

        call.terminate(Termination::Ended, started + Duration::seconds(10))
            .unwrap();

        assert_eq!(call.status, CallStatus::Ended);
        assert_eq!(call.duration_secs, 10);
    }

    #[test]
    fn skip_keeps_zero_duration() {
        let mut call = CallRecord::new(Uuid::new_v4(), now());
        let started = now();
        call.activate(Uuid::new_v4(), started).unwrap();

        call.terminate(Termination::Skipped, started + Duration::seconds(42))
            .unwrap();

        assert_eq!(call.status, CallStatus::Skipped);
        assert_eq!(call.duration_secs, 0);
        assert!(call.ended_at.is_some());
    }

    #[test]
    fn abandoned_waiting_call_ends_without_participant() {
        let mut call = CallRecord::new(Uuid::new_v4(), now());
        call.terminate(Termination::Ended, now()).unwrap();

        assert_eq!(call.status, CallStatus::Ended);
        assert!(call.participant.is_none());
        assert_eq!(call.duration_secs, 0);
    }

    #[test]
    fn terminal_calls_are_immutable() {
        let mut call = CallRecord::new(Uuid::new_v4(), now());
        call.terminate(Termination::Skipped, now()).unwrap();

        assert!(call.terminate(Termination::Ended, now()).is_err());
        assert!(call.activate(Uuid::new_v4(), now()).is_err());
    }

    #[test]
    fn store_roundtrips_and_mutates_records() {
        let store = CallStore::new();
        let initiator = Uuid::new_v4();
        let created = store.create(initiator, now());

        let fetched = store.get(created.id).unwrap();
        assert_eq!(fetched.initiator, initiator);

        store
            .apply(created.id, |call| {
                call.activate(Uuid::new_v4(), now()).unwrap();
            })
            .unwrap();
        assert_eq!(store.get(created.id).unwrap().status, CallStatus::Active);
    }
}

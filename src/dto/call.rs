use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::validation::validate_handle,
    services::matchmaking::MatchTier,
    state::{
        calls::{CallRecord, CallStatus},
        presence::UserRecord,
    },
};

/// Request body bringing a user online with a display handle.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PresenceHello {
    /// Display handle shown to chat peers.
    pub handle: String,
}

impl Validate for PresenceHello {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_handle(&self.handle) {
            errors.add("handle", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Request body toggling the looking-for-call flag.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LookingRequest {
    /// Whether the user is actively advertising for a match.
    pub looking: bool,
}

/// Wire representation of a call's lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallStatusView {
    /// Waiting for the matchmaking engine to bind a counterpart.
    Waiting,
    /// Bound and live.
    Active,
    /// Terminated normally.
    Ended,
    /// Terminated by a skip.
    Skipped,
}

impl From<CallStatus> for CallStatusView {
    fn from(status: CallStatus) -> Self {
        match status {
            CallStatus::Waiting => CallStatusView::Waiting,
            CallStatus::Active => CallStatusView::Active,
            CallStatus::Ended => CallStatusView::Ended,
            CallStatus::Skipped => CallStatusView::Skipped,
        }
    }
}

/// Snapshot of a user's presence state.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserSummary {
    /// Stable user identifier.
    pub id: Uuid,
    /// Display handle.
    pub handle: String,
    /// Whether the user counts as online.
    pub online: bool,
    /// RFC 3339 timestamp of the last registry update.
    pub last_seen: String,
    /// Whether the user is advertising for a match.
    pub looking_for_call: bool,
    /// The user's current call id, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_call: Option<Uuid>,
}

impl From<UserRecord> for UserSummary {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            handle: record.handle,
            online: record.online,
            last_seen: super::format_timestamp(record.last_seen),
            looking_for_call: record.looking_for_call,
            current_call: record.current_call,
        }
    }
}

/// Snapshot of a call record.
#[derive(Debug, Serialize, ToSchema)]
pub struct CallSummary {
    /// Stable call identifier.
    pub id: Uuid,
    /// User who created the call.
    pub initiator: Uuid,
    /// Counterpart bound by the matchmaking engine, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant: Option<Uuid>,
    /// Current lifecycle status.
    pub status: CallStatusView,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the waiting-to-active transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// RFC 3339 timestamp of the terminal transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    /// Whole seconds of connected time; zero for skips and unstarted calls.
    pub duration_secs: i64,
}

impl From<CallRecord> for CallSummary {
    fn from(record: CallRecord) -> Self {
        Self {
            id: record.id,
            initiator: record.initiator,
            participant: record.participant,
            status: record.status.into(),
            created_at: super::format_timestamp(record.created_at),
            started_at: record.started_at.map(super::format_timestamp),
            ended_at: record.ended_at.map(super::format_timestamp),
            duration_secs: record.duration_secs,
        }
    }
}

/// Outcome of a `FindMatch` request. "No match" is a normal result, not an error.
#[derive(Debug, Serialize, ToSchema)]
pub struct MatchResponse {
    /// Whether a counterpart was bound.
    pub matched: bool,
    /// The requester's call after binding, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<CallSummary>,
    /// The bound counterpart, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterpart: Option<UserSummary>,
    /// Which fallback tier produced the match, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<MatchTier>,
}

impl MatchResponse {
    /// Build the no-match outcome.
    pub fn no_match() -> Self {
        Self {
            matched: false,
            call: None,
            counterpart: None,
            tier: None,
        }
    }
}

/// Simple acknowledgement returned by lifecycle operations.
#[derive(Debug, Serialize, ToSchema)]
pub struct AckResponse {
    /// What the operation did ("skipped", "ended", "logged_out").
    pub status: String,
}

impl AckResponse {
    /// Acknowledge a skip.
    pub fn skipped() -> Self {
        Self {
            status: "skipped".to_string(),
        }
    }

    /// Acknowledge an end.
    pub fn ended() -> Self {
        Self {
            status: "ended".to_string(),
        }
    }

    /// Acknowledge a logout.
    pub fn logged_out() -> Self {
        Self {
            status: "logged_out".to_string(),
        }
    }
}

//! Shared application state: presence registry, call store, rooms, and hubs.

pub mod calls;
pub mod events;
pub mod messages;
pub mod presence;
pub mod rooms;

use std::sync::Arc;

use rand::{Rng, SeedableRng, rngs::StdRng};
use tokio::sync::Mutex;

use crate::config::AppConfig;

pub use self::events::{EventHub, MatchWatch};
use self::{
    calls::CallStore, messages::MessageLog, presence::PresenceRegistry, rooms::RoomRegistry,
};

/// Cheaply cloneable handle to the central application state.
pub type SharedState = Arc<AppState>;

/// Central application state storing presence, calls, rooms, and event hubs.
pub struct AppState {
    config: AppConfig,
    presence: PresenceRegistry,
    calls: CallStore,
    messages: MessageLog,
    rooms: RoomRegistry,
    events: EventHub,
    match_watch: MatchWatch,
    pairing_gate: Mutex<()>,
    rng: Mutex<StdRng>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig) -> SharedState {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Construct state with a deterministic random source, so matching
    /// outcomes are reproducible in tests.
    pub fn with_seeded_rng(config: AppConfig, seed: u64) -> SharedState {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: AppConfig, rng: StdRng) -> SharedState {
        let events = EventHub::new(config.event_capacity());
        let match_watch = MatchWatch::new(config.watch_capacity());
        Arc::new(Self {
            config,
            presence: PresenceRegistry::new(),
            calls: CallStore::new(),
            messages: MessageLog::new(),
            rooms: RoomRegistry::new(),
            events,
            match_watch,
            pairing_gate: Mutex::new(()),
            rng: Mutex::new(rng),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Registry of user presence and availability flags.
    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Store of call records.
    pub fn calls(&self) -> &CallStore {
        &self.calls
    }

    /// Per-call chat message log.
    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    /// Registry of live relay rooms.
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Broadcast hub feeding the shared SSE stream.
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// Per-user match notification channels.
    pub fn match_watch(&self) -> &MatchWatch {
        &self.match_watch
    }

    /// Gate serializing multi-record pairing transactions.
    ///
    /// Every operation that writes more than one user or call record (bind,
    /// mirrored termination, preemption) holds this while it validates and
    /// mutates, so contending matchers observe each other's updates.
    pub fn pairing_gate(&self) -> &Mutex<()> {
        &self.pairing_gate
    }

    /// Pick a uniformly random index below `len` from the shared generator.
    pub async fn pick_index(&self, len: usize) -> usize {
        let mut rng = self.rng.lock().await;
        rng.random_range(0..len)
    }
}

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dto::events::ServerEvent;

/// Simple broadcast hub wrapper feeding the shared SSE stream.
pub struct EventHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}

/// Per-user notification channels for push-based match delivery.
///
/// Channels are created lazily on first subscription and pruned once a
/// notification finds no remaining receivers, so idle users cost nothing.
pub struct MatchWatch {
    channels: DashMap<Uuid, broadcast::Sender<ServerEvent>>,
    capacity: usize,
}

impl MatchWatch {
    /// Construct the watch registry with a per-channel capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    /// Subscribe to match notifications addressed to `user`.
    pub fn subscribe(&self, user: Uuid) -> broadcast::Receiver<ServerEvent> {
        self.channels
            .entry(user)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver an event to `user`'s subscribers, if any are listening.
    pub fn notify(&self, user: Uuid, event: ServerEvent) {
        let Some(sender) = self.channels.get(&user).map(|entry| entry.clone()) else {
            return;
        };
        if sender.send(event).is_err() {
            self.channels
                .remove_if(&user, |_, sender| sender.receiver_count() == 0);
        }
    }
}

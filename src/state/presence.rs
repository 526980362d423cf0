use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// Per-user presence and pairing state tracked by the registry.
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// Stable identifier handed in by the external auth collaborator.
    pub id: Uuid,
    /// Display handle shown to chat peers.
    pub handle: String,
    /// Whether the user currently counts as online.
    pub online: bool,
    /// Last activity timestamp; every registry update refreshes it.
    pub last_seen: OffsetDateTime,
    /// Whether the user is actively advertising for a match.
    pub looking_for_call: bool,
    /// The user's current non-terminal call, if any.
    pub current_call: Option<Uuid>,
    /// Registration order; Tier 1 picks the smallest among candidates.
    pub seq: u64,
    /// Bumped on every mutation; the engine's compare-and-set validates it.
    pub version: u64,
}

/// Registry of user presence backed by fine-grained per-entry locking.
///
/// Single-record updates go through the semantic methods below and are atomic
/// per entry. Multi-record pairing transactions read snapshots here, then
/// re-validate `version` under the pairing gate before writing.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    users: DashMap<Uuid, UserRecord>,
    next_seq: AtomicU64,
}

impl PresenceRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring a user online, registering the record on first sight.
    pub fn set_online(&self, id: Uuid, handle: &str) {
        let now = OffsetDateTime::now_utc();
        match self.users.get_mut(&id) {
            Some(mut entry) => {
                entry.online = true;
                entry.last_seen = now;
                if !handle.is_empty() {
                    entry.handle = handle.to_string();
                }
                entry.version += 1;
            }
            None => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                self.users.insert(
                    id,
                    UserRecord {
                        id,
                        handle: handle.to_string(),
                        online: true,
                        last_seen: now,
                        looking_for_call: false,
                        current_call: None,
                        seq,
                        version: 0,
                    },
                );
            }
        }
    }

    /// Mark a user offline. Clears the looking flag so an offline user never
    /// advertises for Tier 1. Returns false when the user is unknown.
    pub fn set_offline(&self, id: Uuid) -> bool {
        let Some(mut entry) = self.users.get_mut(&id) else {
            return false;
        };
        entry.online = false;
        entry.looking_for_call = false;
        entry.last_seen = OffsetDateTime::now_utc();
        entry.version += 1;
        true
    }

    /// Refresh a user's last-activity timestamp.
    pub fn touch(&self, id: Uuid) {
        if let Some(mut entry) = self.users.get_mut(&id) {
            entry.last_seen = OffsetDateTime::now_utc();
            entry.version += 1;
        }
    }

    /// Toggle whether the user is actively seeking a match.
    /// Returns false when the user is unknown.
    pub fn mark_looking(&self, id: Uuid, looking: bool) -> bool {
        let Some(mut entry) = self.users.get_mut(&id) else {
            return false;
        };
        entry.looking_for_call = looking;
        entry.last_seen = OffsetDateTime::now_utc();
        entry.version += 1;
        true
    }

    /// Snapshot a single user record.
    pub fn get(&self, id: Uuid) -> Option<UserRecord> {
        self.users.get(&id).map(|entry| entry.clone())
    }

    /// Current version counter for a user, used by compare-and-set reads.
    pub fn version_of(&self, id: Uuid) -> Option<u64> {
        self.users.get(&id).map(|entry| entry.version)
    }

    /// Mutate a record in place, bumping its version.
    ///
    /// The closure gets full control over the fields (including `last_seen`);
    /// callers performing multi-record transactions must hold the pairing
    /// gate. Returns the closure's result, or `None` for unknown users.
    pub fn apply<T>(&self, id: Uuid, f: impl FnOnce(&mut UserRecord) -> T) -> Option<T> {
        self.users.get_mut(&id).map(|mut entry| {
            let result = f(&mut entry);
            entry.version += 1;
            result
        })
    }

    /// All users currently online.
    pub fn online_users(&self) -> Vec<UserRecord> {
        self.users
            .iter()
            .filter(|entry| entry.online)
            .map(|entry| entry.clone())
            .collect()
    }

    /// Online users actively advertising for a match.
    pub fn looking_users(&self) -> Vec<UserRecord> {
        self.users
            .iter()
            .filter(|entry| entry.online && entry.looking_for_call)
            .map(|entry| entry.clone())
            .collect()
    }

    /// Online users whose last activity falls within `window`.
    pub fn recently_active(&self, window: Duration) -> Vec<UserRecord> {
        let threshold = OffsetDateTime::now_utc() - window;
        self.users
            .iter()
            .filter(|entry| entry.online && entry.last_seen >= threshold)
            .map(|entry| entry.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_online_registers_and_refreshes() {
        let registry = PresenceRegistry::new();
        let id = Uuid::new_v4();

        registry.set_online(id, "gull");
        let first = registry.get(id).unwrap();
        assert!(first.online);
        assert_eq!(first.handle, "gull");
        assert_eq!(first.seq, 0);

        registry.set_online(id, "heron");
        let second = registry.get(id).unwrap();
        assert_eq!(second.handle, "heron");
        assert_eq!(second.seq, 0);
        assert!(second.version > first.version);
    }

    #[test]
    fn registration_order_is_stable() {
        let registry = PresenceRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        registry.set_online(first, "a");
        registry.set_online(second, "b");

        assert!(registry.get(first).unwrap().seq < registry.get(second).unwrap().seq);
    }

    #[test]
    fn offline_clears_looking() {
        let registry = PresenceRegistry::new();
        let id = Uuid::new_v4();
        registry.set_online(id, "a");
        registry.mark_looking(id, true);

        assert!(registry.set_offline(id));

        let record = registry.get(id).unwrap();
        assert!(!record.online);
        assert!(!record.looking_for_call);
    }

    #[test]
    fn unknown_users_are_reported() {
        let registry = PresenceRegistry::new();
        assert!(!registry.set_offline(Uuid::new_v4()));
        assert!(!registry.mark_looking(Uuid::new_v4(), true));
        assert!(registry.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn queries_filter_on_presence_fields() {
        let registry = PresenceRegistry::new();
        let online = Uuid::new_v4();
        let looking = Uuid::new_v4();
        let offline = Uuid::new_v4();

        registry.set_online(online, "a");
        registry.set_online(looking, "b");
        registry.mark_looking(looking, true);
        registry.set_online(offline, "c");
        registry.set_offline(offline);

        let online_ids: Vec<_> = registry.online_users().iter().map(|u| u.id).collect();
        assert!(online_ids.contains(&online));
        assert!(online_ids.contains(&looking));
        assert!(!online_ids.contains(&offline));

        let looking_ids: Vec<_> = registry.looking_users().iter().map(|u| u.id).collect();
        assert_eq!(looking_ids, vec![looking]);
    }

    #[test]
    fn recently_active_honors_the_window() {
        let registry = PresenceRegistry::new();
        let fresh = Uuid::new_v4();
        let stale = Uuid::new_v4();

        registry.set_online(fresh, "a");
        registry.set_online(stale, "b");
        registry.apply(stale, |record| {
            record.last_seen = OffsetDateTime::now_utc() - time::Duration::minutes(10);
        });

        let recent: Vec<_> = registry
            .recently_active(Duration::from_secs(300))
            .iter()
            .map(|u| u.id)
            .collect();
        assert!(recent.contains(&fresh));
        assert!(!recent.contains(&stale));
    }

    #[test]
    fn apply_bumps_version() {
        let registry = PresenceRegistry::new();
        let id = Uuid::new_v4();
        registry.set_online(id, "a");

        let before = registry.version_of(id).unwrap();
        registry.apply(id, |record| record.current_call = Some(Uuid::new_v4()));
        assert_eq!(registry.version_of(id).unwrap(), before + 1);
    }
}

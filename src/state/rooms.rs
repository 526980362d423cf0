use axum::extract::ws::Message;
use dashmap::DashMap;
use indexmap::IndexMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifies a broadcast room: one per call, plus the global matching room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomId {
    /// Relay room scoped to a single call.
    Call(Uuid),
    /// Global room carrying match-availability announcements.
    Matching,
}

#[derive(Clone)]
/// Handle used to push messages to a connection attached to a room.
pub struct RoomMember {
    /// Unique id of the underlying socket connection.
    pub conn_id: Uuid,
    /// Authenticated user behind the connection, when known.
    pub user: Option<Uuid>,
    /// Writer channel feeding the connection's outbound task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Registry of live rooms and their members, keyed by room id.
///
/// Membership is kept in join order. Rooms are created lazily on first join
/// and dropped once the last member leaves.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<RoomId, IndexMap<Uuid, RoomMember>>,
}

impl RoomRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a connection to a room.
    pub fn join(&self, room: RoomId, member: RoomMember) {
        self.rooms
            .entry(room)
            .or_default()
            .insert(member.conn_id, member);
    }

    /// Detach a connection from a room, dropping the room when it empties.
    pub fn leave(&self, room: RoomId, conn_id: Uuid) {
        if let Some(mut members) = self.rooms.get_mut(&room) {
            members.shift_remove(&conn_id);
        }
        self.rooms.remove_if(&room, |_, members| members.is_empty());
    }

    /// Number of connections currently attached to a room.
    pub fn member_count(&self, room: RoomId) -> usize {
        self.rooms
            .get(&room)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    /// Send a text payload to every member of a room, optionally excluding
    /// the sending connection. Members whose writer has gone away are pruned.
    /// Returns how many members the payload was delivered to.
    pub fn broadcast(&self, room: RoomId, payload: &str, exclude: Option<Uuid>) -> usize {
        let Some(mut members) = self.rooms.get_mut(&room) else {
            return 0;
        };

        let frame = Message::Text(payload.to_owned().into());
        let mut delivered = 0;
        let mut dead = Vec::new();
        for (conn_id, member) in members.iter() {
            if Some(*conn_id) == exclude {
                continue;
            }
            if member.tx.send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*conn_id);
            }
        }
        for conn_id in dead {
            members.shift_remove(&conn_id);
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(user: Option<Uuid>) -> (RoomMember, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            RoomMember {
                conn_id: Uuid::new_v4(),
                user,
                tx,
            },
            rx,
        )
    }

    #[test]
    fn broadcast_skips_the_sender() {
        let registry = RoomRegistry::new();
        let room = RoomId::Call(Uuid::new_v4());
        let (alice, mut alice_rx) = member(Some(Uuid::new_v4()));
        let (bob, mut bob_rx) = member(Some(Uuid::new_v4()));
        let alice_conn = alice.conn_id;

        registry.join(room, alice);
        registry.join(room, bob);

        let delivered = registry.broadcast(room, "hello", Some(alice_conn));
        assert_eq!(delivered, 1);
        assert!(alice_rx.try_recv().is_err());
        assert!(matches!(bob_rx.try_recv(), Ok(Message::Text(text)) if text == "hello"));
    }

    #[test]
    fn broadcast_without_exclusion_reaches_everyone() {
        let registry = RoomRegistry::new();
        let room = RoomId::Matching;
        let (alice, mut alice_rx) = member(None);
        let (bob, mut bob_rx) = member(None);

        registry.join(room, alice);
        registry.join(room, bob);

        assert_eq!(registry.broadcast(room, "ping", None), 2);
        assert!(alice_rx.try_recv().is_ok());
        assert!(bob_rx.try_recv().is_ok());
    }

    #[test]
    fn rooms_are_dropped_when_emptied() {
        let registry = RoomRegistry::new();
        let room = RoomId::Call(Uuid::new_v4());
        let (alice, _alice_rx) = member(None);
        let conn = alice.conn_id;

        registry.join(room, alice);
        assert_eq!(registry.member_count(room), 1);

        registry.leave(room, conn);
        assert_eq!(registry.member_count(room), 0);
        assert!(registry.rooms.get(&room).is_none());
    }

    #[test]
    fn dead_members_are_pruned_on_broadcast() {
        let registry = RoomRegistry::new();
        let room = RoomId::Call(Uuid::new_v4());
        let (alice, alice_rx) = member(None);
        let (bob, mut bob_rx) = member(None);
        drop(alice_rx);

        registry.join(room, alice);
        registry.join(room, bob);

        assert_eq!(registry.broadcast(room, "x", None), 1);
        assert_eq!(registry.member_count(room), 1);
        assert!(bob_rx.try_recv().is_ok());
    }
}

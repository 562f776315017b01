use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use parley_types::events::GatewayEvent;
use parley_types::models::UserRef;

/// Snapshot captured when a connection leaves a room, taken before the
/// membership pointer is cleared so departure broadcasts can still name the
/// user.
#[derive(Debug, Clone)]
pub struct RoomExit {
    pub channel_id: Uuid,
    pub user: Option<UserRef>,
}

/// Tracks every live connection, the identity bound to it, and its current
/// room. A "room" is not stored — it is the set of connections whose active
/// room is a given channel, kept as an incrementally maintained index so the
/// eviction path never scans all connections.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<Uuid, ConnectionEntry>,
    /// channel_id -> member connection ids
    rooms: HashMap<Uuid, HashSet<Uuid>>,
}

struct ConnectionEntry {
    user: Option<UserRef>,
    active_room: Option<Uuid>,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
        }
    }

    /// Register a connection on transport open. It starts with no bound user
    /// and no active room. Returns the receiver half of its outbound queue.
    pub async fn register(&self, conn_id: Uuid) -> mpsc::UnboundedReceiver<GatewayEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().await.connections.insert(
            conn_id,
            ConnectionEntry {
                user: None,
                active_room: None,
                tx,
            },
        );
        rx
    }

    /// Bind identity and switch rooms in one critical section, so the
    /// single-active-room invariant can never be observed mid-transition.
    /// A `None` user keeps whatever identity was already bound. Returns the
    /// previous room and the effective bound user.
    pub async fn enter_room(
        &self,
        conn_id: Uuid,
        user: Option<UserRef>,
        channel_id: Uuid,
    ) -> Option<(Option<Uuid>, Option<UserRef>)> {
        let mut inner = self.inner.write().await;
        let inner = &mut *inner;
        let entry = inner.connections.get_mut(&conn_id)?;
        if let Some(u) = user {
            entry.user = Some(u);
        }
        let prev = entry.active_room.replace(channel_id);
        let bound = entry.user.clone();

        if let Some(prev_room) = prev {
            detach(&mut inner.rooms, prev_room, conn_id);
        }
        inner.rooms.entry(channel_id).or_default().insert(conn_id);

        Some((prev, bound))
    }

    /// Clear the connection's room, but only if it is currently `channel_id`.
    /// Used for both voluntary leaves and eviction; idempotent.
    pub async fn leave_room(&self, conn_id: Uuid, channel_id: Uuid) -> Option<RoomExit> {
        let mut inner = self.inner.write().await;
        let inner = &mut *inner;
        let entry = inner.connections.get_mut(&conn_id)?;
        if entry.active_room != Some(channel_id) {
            return None;
        }
        entry.active_room = None;
        let user = entry.user.clone();
        detach(&mut inner.rooms, channel_id, conn_id);
        Some(RoomExit { channel_id, user })
    }

    /// Remove the connection on transport close. Returns the room it was in,
    /// if any, so the caller can emit the same leave broadcast as an explicit
    /// leave.
    pub async fn unregister(&self, conn_id: Uuid) -> Option<RoomExit> {
        let mut inner = self.inner.write().await;
        let inner = &mut *inner;
        let entry = inner.connections.remove(&conn_id)?;
        let room = entry.active_room?;
        detach(&mut inner.rooms, room, conn_id);
        Some(RoomExit {
            channel_id: room,
            user: entry.user,
        })
    }

    /// Live connections bound to `user_id` whose active room is `channel_id`.
    /// The room index narrows the scan to one room's members.
    pub async fn find_by_user_in_room(&self, channel_id: Uuid, user_id: Uuid) -> Vec<Uuid> {
        let inner = self.inner.read().await;
        let Some(members) = inner.rooms.get(&channel_id) else {
            return Vec::new();
        };
        members
            .iter()
            .filter(|conn_id| {
                inner
                    .connections
                    .get(conn_id)
                    .and_then(|entry| entry.user.as_ref())
                    .is_some_and(|u| u.id == user_id)
            })
            .copied()
            .collect()
    }

    pub async fn active_room(&self, conn_id: Uuid) -> Option<Uuid> {
        let inner = self.inner.read().await;
        inner.connections.get(&conn_id)?.active_room
    }

    /// Identity currently bound to the connection, if any.
    pub async fn bound_user(&self, conn_id: Uuid) -> Option<UserRef> {
        let inner = self.inner.read().await;
        inner.connections.get(&conn_id)?.user.clone()
    }

    /// Send a targeted event to one connection. A closed receiver is the
    /// connection's teardown in progress; the send is dropped silently.
    pub async fn send_to(&self, conn_id: Uuid, event: GatewayEvent) {
        let inner = self.inner.read().await;
        if let Some(entry) = inner.connections.get(&conn_id) {
            let _ = entry.tx.send(event);
        }
    }

    /// Fan an event out to every member of a room, optionally excluding one
    /// connection (usually the originator). One dead recipient must not
    /// prevent delivery to the rest. Returns the delivery count.
    pub async fn broadcast_room(
        &self,
        channel_id: Uuid,
        exclude: Option<Uuid>,
        event: GatewayEvent,
    ) -> usize {
        let inner = self.inner.read().await;
        let Some(members) = inner.rooms.get(&channel_id) else {
            return 0;
        };
        let mut delivered = 0;
        for conn_id in members {
            if exclude == Some(*conn_id) {
                continue;
            }
            if let Some(entry) = inner.connections.get(conn_id) {
                if entry.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    #[cfg(test)]
    async fn assert_consistent(&self) {
        let inner = self.inner.read().await;
        for (conn_id, entry) in &inner.connections {
            if let Some(room) = entry.active_room {
                assert!(
                    inner.rooms.get(&room).is_some_and(|m| m.contains(conn_id)),
                    "connection {conn_id} points at room {room} but is not indexed there"
                );
            }
        }
        for (room, members) in &inner.rooms {
            for conn_id in members {
                let entry = inner.connections.get(conn_id).expect("indexed ghost connection");
                assert_eq!(entry.active_room, Some(*room));
            }
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn detach(rooms: &mut HashMap<Uuid, HashSet<Uuid>>, channel_id: Uuid, conn_id: Uuid) {
    if let Some(members) = rooms.get_mut(&channel_id) {
        members.remove(&conn_id);
        if members.is_empty() {
            rooms.remove(&channel_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> UserRef {
        UserRef {
            id: Uuid::new_v4(),
            username: name.to_string(),
        }
    }

    #[tokio::test]
    async fn active_room_is_single_valued() {
        let registry = ConnectionRegistry::new();
        let conn = Uuid::new_v4();
        let (room_a, room_b) = (Uuid::new_v4(), Uuid::new_v4());
        let alice = user("alice");

        let _rx = registry.register(conn).await;
        let (prev, _) = registry
            .enter_room(conn, Some(alice.clone()), room_a)
            .await
            .unwrap();
        assert_eq!(prev, None);

        let (prev, bound) = registry.enter_room(conn, None, room_b).await.unwrap();
        assert_eq!(prev, Some(room_a));
        assert_eq!(bound, Some(alice.clone()));
        assert_eq!(registry.active_room(conn).await, Some(room_b));

        // The old room no longer indexes the connection.
        assert!(
            registry
                .find_by_user_in_room(room_a, alice.id)
                .await
                .is_empty()
        );
        assert_eq!(registry.find_by_user_in_room(room_b, alice.id).await, vec![conn]);
        registry.assert_consistent().await;
    }

    #[tokio::test]
    async fn leave_room_only_clears_matching_room() {
        let registry = ConnectionRegistry::new();
        let conn = Uuid::new_v4();
        let (room_a, room_b) = (Uuid::new_v4(), Uuid::new_v4());

        let _rx = registry.register(conn).await;
        registry.enter_room(conn, Some(user("alice")), room_a).await;

        // Leaving a room we are not in is a no-op.
        assert!(registry.leave_room(conn, room_b).await.is_none());
        assert_eq!(registry.active_room(conn).await, Some(room_a));

        let exit = registry.leave_room(conn, room_a).await.unwrap();
        assert_eq!(exit.channel_id, room_a);
        assert_eq!(exit.user.unwrap().username, "alice");
        assert_eq!(registry.active_room(conn).await, None);

        // Idempotent.
        assert!(registry.leave_room(conn, room_a).await.is_none());
        registry.assert_consistent().await;
    }

    #[tokio::test]
    async fn unregister_reports_the_abandoned_room() {
        let registry = ConnectionRegistry::new();
        let conn = Uuid::new_v4();
        let room = Uuid::new_v4();
        let alice = user("alice");

        let _rx = registry.register(conn).await;
        registry.enter_room(conn, Some(alice.clone()), room).await;

        let exit = registry.unregister(conn).await.unwrap();
        assert_eq!(exit.channel_id, room);
        assert_eq!(exit.user, Some(alice.clone()));
        assert!(registry.find_by_user_in_room(room, alice.id).await.is_empty());
        assert_eq!(registry.active_room(conn).await, None);
        registry.assert_consistent().await;
    }

    #[tokio::test]
    async fn find_by_user_matches_identity_not_just_presence() {
        let registry = ConnectionRegistry::new();
        let room = Uuid::new_v4();
        let alice = user("alice");
        let bob = user("bob");

        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();
        let conn_anon = Uuid::new_v4();
        let _rx_a = registry.register(conn_a).await;
        let _rx_b = registry.register(conn_b).await;
        let _rx_anon = registry.register(conn_anon).await;

        registry.enter_room(conn_a, Some(alice.clone()), room).await;
        registry.enter_room(conn_b, Some(bob.clone()), room).await;
        registry.enter_room(conn_anon, None, room).await;

        assert_eq!(registry.find_by_user_in_room(room, alice.id).await, vec![conn_a]);
        assert_eq!(registry.find_by_user_in_room(room, bob.id).await, vec![conn_b]);
    }

    #[tokio::test]
    async fn broadcast_excludes_originator_and_skips_dead_receivers() {
        let registry = ConnectionRegistry::new();
        let room = Uuid::new_v4();

        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();
        let conn_c = Uuid::new_v4();
        let _rx_a = registry.register(conn_a).await;
        let mut rx_b = registry.register(conn_b).await;
        let rx_c = registry.register(conn_c).await;

        registry.enter_room(conn_a, Some(user("a")), room).await;
        registry.enter_room(conn_b, Some(user("b")), room).await;
        registry.enter_room(conn_c, Some(user("c")), room).await;

        // conn_c's socket task is gone.
        drop(rx_c);

        let delivered = registry
            .broadcast_room(
                room,
                Some(conn_a),
                GatewayEvent::MessageCountChanged { channel_id: room },
            )
            .await;
        assert_eq!(delivered, 1);
        assert!(matches!(
            rx_b.recv().await,
            Some(GatewayEvent::MessageCountChanged { .. })
        ));
    }

    /// Interleave join/leave/disconnect across tasks and check the
    /// connection table and room index never disagree.
    #[tokio::test]
    async fn interleaved_transitions_keep_index_consistent() {
        let registry = ConnectionRegistry::new();
        let rooms: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();

        let mut handles = Vec::new();
        for worker in 0u64..8 {
            let registry = registry.clone();
            let rooms = rooms.clone();
            handles.push(tokio::spawn(async move {
                let conn = Uuid::new_v4();
                let identity = UserRef {
                    id: Uuid::new_v4(),
                    username: format!("user-{worker}"),
                };
                let _rx = registry.register(conn).await;
                // Simple deterministic mix of transitions per worker.
                let mut state = worker.wrapping_mul(2654435761);
                for _ in 0..50 {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    let room = rooms[(state >> 33) as usize % rooms.len()];
                    match state % 3 {
                        0 => {
                            registry.enter_room(conn, Some(identity.clone()), room).await;
                        }
                        1 => {
                            registry.leave_room(conn, room).await;
                        }
                        _ => {
                            registry.enter_room(conn, None, room).await;
                        }
                    }
                }
                registry.unregister(conn).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        registry.assert_consistent().await;
    }
}

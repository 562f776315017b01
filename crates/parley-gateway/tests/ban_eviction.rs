//! End-to-end moderation flow against a live registry and in-memory store:
//! a user in a room is banned, gets evicted before the ban call would
//! return, other members see the departure, and a rejoin is denied.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use parley_db::{Database, encode_timestamp};
use parley_gateway::moderation;
use parley_gateway::registry::ConnectionRegistry;
use parley_gateway::rooms::{Effect, RoomManager};
use parley_types::events::{DENIED_BANNED, GatewayEvent};
use parley_types::models::UserRef;

const GENERAL: &str = "00000000-0000-0000-0000-000000000002";

#[tokio::test]
async fn ban_evicts_live_session_and_blocks_rejoin() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let rooms = RoomManager::new(ConnectionRegistry::new(), db.clone());
    let general: Uuid = GENERAL.parse().unwrap();

    let alice = UserRef {
        id: Uuid::new_v4(),
        username: "alice".to_string(),
    };
    let bob = UserRef {
        id: Uuid::new_v4(),
        username: "bob".to_string(),
    };
    let moderator = Uuid::new_v4();

    // Both users live in "general".
    let alice_conn = Uuid::new_v4();
    let mut alice_rx = rooms.registry().register(alice_conn).await;
    let bob_conn = Uuid::new_v4();
    let mut bob_rx = rooms.registry().register(bob_conn).await;

    for (conn, user) in [(bob_conn, bob.clone()), (alice_conn, alice.clone())] {
        let effects = rooms.join(conn, general, Some(user)).await.unwrap();
        rooms.apply(conn, effects).await;
    }
    assert!(matches!(alice_rx.recv().await, Some(GatewayEvent::Joined { .. })));
    assert!(matches!(bob_rx.recv().await, Some(GatewayEvent::Joined { .. })));
    assert!(matches!(bob_rx.recv().await, Some(GatewayEvent::PresenceJoin { .. })));

    // Moderator bans alice: new record, then synchronous eviction.
    let created = db
        .upsert_ban(
            GENERAL,
            &alice.id.to_string(),
            "spam",
            &moderator.to_string(),
            &encode_timestamp(Utc::now()),
        )
        .unwrap();
    assert!(created);
    let evicted = moderation::evict_banned(&rooms, general, alice.id).await;
    assert_eq!(evicted, 1);

    // Eviction completed before the ban call returns.
    assert!(
        rooms
            .registry()
            .find_by_user_in_room(general, alice.id)
            .await
            .is_empty()
    );

    // Bob saw alice leave.
    match bob_rx.recv().await {
        Some(GatewayEvent::PresenceLeave { user, channel_id, .. }) => {
            assert_eq!(channel_id, general);
            assert_eq!(user.unwrap().id, alice.id);
        }
        other => panic!("expected PresenceLeave, got {other:?}"),
    }

    // Alice's socket is out of the room: no further message delivery.
    rooms
        .broadcast_to_room(general, GatewayEvent::MessageCountChanged { channel_id: general })
        .await;
    assert!(alice_rx.try_recv().is_err());
    assert!(bob_rx.try_recv().is_ok());

    // Rejoin attempt is denied without crashing the connection.
    let effects = rooms
        .join(alice_conn, general, Some(alice.clone()))
        .await
        .unwrap();
    assert_eq!(effects.len(), 1);
    assert!(matches!(
        &effects[0],
        Effect::Reply(GatewayEvent::Denied { reason, .. }) if reason == DENIED_BANNED
    ));
    rooms.apply(alice_conn, effects).await;
    assert!(matches!(alice_rx.recv().await, Some(GatewayEvent::Denied { .. })));
    assert_eq!(rooms.registry().active_room(alice_conn).await, None);

    // Unban lets her back in.
    db.delete_ban(GENERAL, &alice.id.to_string()).unwrap();
    let effects = rooms.join(alice_conn, general, Some(alice)).await.unwrap();
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::Reply(GatewayEvent::Joined { .. }))));
}

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use parley_types::events::GatewayEvent;

use crate::rooms::RoomManager;

/// Forcibly remove every live session for `user_id` from `channel_id`'s
/// room. Runs synchronously inside the ban-creation request, after a new
/// ban record was written, so the ban call does not return until eviction
/// is complete.
///
/// Idempotent: most bans target users with no live session, in which case
/// this is a no-op. The bound-user metadata is captured before the room
/// pointer is cleared so the departure broadcast can still name the user.
pub async fn evict_banned(rooms: &RoomManager, channel_id: Uuid, user_id: Uuid) -> usize {
    let registry = rooms.registry();
    let mut evicted = 0;

    for conn_id in registry.find_by_user_in_room(channel_id, user_id).await {
        // leave_room only clears the room if the connection is still in it,
        // so a concurrent voluntary leave or room switch is harmless.
        let Some(exit) = registry.leave_room(conn_id, channel_id).await else {
            continue;
        };
        registry
            .broadcast_room(
                exit.channel_id,
                Some(conn_id),
                GatewayEvent::PresenceLeave {
                    channel_id: exit.channel_id,
                    user: exit.user,
                    at: Utc::now(),
                },
            )
            .await;
        evicted += 1;
    }

    if evicted > 0 {
        info!(
            "evicted {} connection(s) of user {} from channel {}",
            evicted, user_id, channel_id
        );
    }
    evicted
}

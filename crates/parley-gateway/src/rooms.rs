use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use parley_db::Database;
use parley_types::events::{DENIED_BANNED, GatewayEvent};
use parley_types::models::UserRef;

use crate::registry::ConnectionRegistry;

/// Outbound messages produced by a room transition. Transitions return
/// effects instead of performing I/O inline, so the state machine is
/// testable without a live transport; `apply` performs the sends.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Targeted at the connection that triggered the transition.
    Reply(GatewayEvent),
    /// Fanned out to a room, optionally excluding one connection.
    Broadcast {
        channel_id: Uuid,
        exclude: Option<Uuid>,
        event: GatewayEvent,
    },
}

/// Owns join/leave transitions and presence broadcast. Per-connection
/// transitions are serialized by the connection's own recv task; cross-
/// connection state lives in the registry behind its lock.
#[derive(Clone)]
pub struct RoomManager {
    registry: ConnectionRegistry,
    db: Arc<Database>,
}

impl RoomManager {
    pub fn new(registry: ConnectionRegistry, db: Arc<Database>) -> Self {
        Self { registry, db }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Attempt a room transition for `conn_id`. The ban check runs before
    /// any mutation — a denied join must not leave the old room. No registry
    /// lock is held across the blocking DB call.
    pub async fn join(
        &self,
        conn_id: Uuid,
        channel_id: Uuid,
        user: Option<UserRef>,
    ) -> Result<Vec<Effect>> {
        // Gate on the resolved identity: a join asserting no user still
        // carries whatever identity is already bound to the connection.
        let joining = match &user {
            Some(u) => Some(u.id),
            None => self.registry.bound_user(conn_id).await.map(|u| u.id),
        };
        if let Some(user_id) = joining {
            let db = self.db.clone();
            let cid = channel_id.to_string();
            let uid = user_id.to_string();
            // This check is not atomic with ban creation: a ban committing
            // between it and enter_room is caught on the session's next
            // transition.
            let banned = tokio::task::spawn_blocking(move || db.is_banned(&cid, &uid)).await??;
            if banned {
                return Ok(vec![Effect::Reply(GatewayEvent::Denied {
                    channel_id,
                    reason: DENIED_BANNED.to_string(),
                })]);
            }
        }

        let Some((prev, bound)) = self.registry.enter_room(conn_id, user, channel_id).await else {
            // Connection closed mid-join; nothing was mutated, nothing to emit.
            return Ok(Vec::new());
        };

        let at = Utc::now();
        let mut effects = Vec::new();
        if let Some(prev_room) = prev.filter(|p| *p != channel_id) {
            effects.push(Effect::Broadcast {
                channel_id: prev_room,
                exclude: Some(conn_id),
                event: GatewayEvent::PresenceLeave {
                    channel_id: prev_room,
                    user: bound.clone(),
                    at,
                },
            });
        }
        effects.push(Effect::Broadcast {
            channel_id,
            exclude: Some(conn_id),
            event: GatewayEvent::PresenceJoin {
                channel_id,
                user: bound,
                at,
            },
        });
        effects.push(Effect::Reply(GatewayEvent::Joined { channel_id }));
        Ok(effects)
    }

    /// Explicit leave request.
    pub async fn leave(&self, conn_id: Uuid, channel_id: Uuid) -> Vec<Effect> {
        match self.registry.leave_room(conn_id, channel_id).await {
            Some(exit) => vec![Effect::Broadcast {
                channel_id: exit.channel_id,
                exclude: Some(conn_id),
                event: GatewayEvent::PresenceLeave {
                    channel_id: exit.channel_id,
                    user: exit.user,
                    at: Utc::now(),
                },
            }],
            None => Vec::new(),
        }
    }

    /// Transport close — explicit disconnect or network drop. Takes the same
    /// leave-broadcast path as an explicit leave for the abandoned room.
    pub async fn disconnect(&self, conn_id: Uuid) -> Vec<Effect> {
        match self.registry.unregister(conn_id).await {
            Some(exit) => vec![Effect::Broadcast {
                channel_id: exit.channel_id,
                exclude: Some(conn_id),
                event: GatewayEvent::PresenceLeave {
                    channel_id: exit.channel_id,
                    user: exit.user,
                    at: Utc::now(),
                },
            }],
            None => Vec::new(),
        }
    }

    /// Perform the sends for a batch of effects, in order. Leave-old is
    /// emitted before join-new because `join` produces them in that order.
    pub async fn apply(&self, conn_id: Uuid, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Reply(event) => self.registry.send_to(conn_id, event).await,
                Effect::Broadcast {
                    channel_id,
                    exclude,
                    event,
                } => {
                    self.registry.broadcast_room(channel_id, exclude, event).await;
                }
            }
        }
    }

    /// Fan an event out to every current member of a channel's room. Used by
    /// the message send path after the durable write succeeds.
    pub async fn broadcast_to_room(&self, channel_id: Uuid, event: GatewayEvent) -> usize {
        self.registry.broadcast_room(channel_id, None, event).await
    }
}

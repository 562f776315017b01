use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::UserRef;

/// Commands sent FROM client TO server over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Enter a channel room. Joining a new room implicitly leaves the
    /// previous one. The optional `user` binds an identity to the connection.
    Join {
        channel_id: Uuid,
        #[serde(default)]
        user: Option<UserRef>,
    },

    /// Explicitly exit a channel room.
    Leave { channel_id: Uuid },
}

/// Events sent FROM server over the WebSocket gateway — either targeted at
/// one connection (Denied/Joined) or broadcast to a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Join refused. Not an error — a normal protocol outcome.
    Denied { channel_id: Uuid, reason: String },

    /// Join accepted. Sent only to the requester, distinct from the room
    /// broadcast, so a client can disambiguate its own join from others'.
    Joined { channel_id: Uuid },

    /// A user entered the room.
    PresenceJoin {
        channel_id: Uuid,
        user: Option<UserRef>,
        at: DateTime<Utc>,
    },

    /// A user left the room — voluntarily, by disconnect, or by eviction.
    PresenceLeave {
        channel_id: Uuid,
        user: Option<UserRef>,
        at: DateTime<Utc>,
    },

    /// A new message was persisted to the channel.
    MessageCreate {
        id: i64,
        channel_id: Uuid,
        sender_id: Uuid,
        sender_name: String,
        body: Option<String>,
        image_ref: Option<String>,
        created_at: DateTime<Utc>,
    },

    /// Lightweight refresh hint for clients that poll the message count.
    MessageCountChanged { channel_id: Uuid },
}

/// Reason code carried in `Denied` when the joining user is banned.
pub const DENIED_BANNED: &str = "banned";

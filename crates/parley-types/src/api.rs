use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub sender_id: Uuid,
    /// Display name to record on the message. When absent the server
    /// resolves it from the sender's profile.
    pub sender_name: Option<String>,
    pub body: Option<String>,
    pub image_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub id: i64,
    pub channel_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub body: Option<String>,
    pub image_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

// -- Bans --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateBanRequest {
    pub user_id: Uuid,
    pub reason: String,
    pub banned_by: Uuid,
}

#[derive(Debug, Serialize)]
pub struct BanResponse {
    pub user_id: Uuid,
    pub reason: String,
    pub banned_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Audit projection joining ban records with channel/group/user display
/// names. Read-only — derived from the bans table, not a second source of
/// truth.
#[derive(Debug, Serialize)]
pub struct BanReport {
    pub group_id: Option<Uuid>,
    pub group_name: Option<String>,
    pub channel_id: Uuid,
    pub channel_name: Option<String>,
    pub user_id: Uuid,
    pub username: Option<String>,
    pub banned_by: Uuid,
    pub banned_by_name: Option<String>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

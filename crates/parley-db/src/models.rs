/// Database row types — these map directly to SQLite rows.
/// Distinct from parley-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub role: String,
}

pub struct ChannelRow {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub group_name: String,
}

#[derive(Debug)]
pub struct MessageRow {
    pub id: i64,
    pub channel_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub body: Option<String>,
    pub image_ref: Option<String>,
    pub created_at: String,
}

pub struct BanRow {
    pub channel_id: String,
    pub user_id: String,
    pub reason: String,
    pub banned_by: String,
    pub created_at: String,
}

pub struct BanReportRow {
    pub group_id: Option<String>,
    pub group_name: Option<String>,
    pub channel_id: String,
    pub channel_name: Option<String>,
    pub user_id: String,
    pub username: Option<String>,
    pub banned_by: String,
    pub banned_by_name: Option<String>,
    pub reason: String,
    pub created_at: String,
}

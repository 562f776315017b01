//! Row -> API type conversions shared by handlers. Corrupt stored values are
//! logged and defaulted rather than failing the whole page, matching how the
//! rest of the system treats read-path decode problems.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use parley_db::models::MessageRow;
use parley_types::api::MessageResponse;

pub(crate) fn parse_uuid(raw: &str, context: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("corrupt {} '{}': {}", context, raw, e);
        Uuid::default()
    })
}

pub(crate) fn parse_timestamp(raw: &str, context: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite column defaults store "YYYY-MM-DD HH:MM:SS" without a
            // timezone. Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("corrupt {} '{}': {}", context, raw, e);
            DateTime::default()
        })
}

pub(crate) fn message_response(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: row.id,
        channel_id: parse_uuid(&row.channel_id, "channel_id"),
        sender_id: parse_uuid(&row.sender_id, "sender_id"),
        sender_name: row.sender_name,
        body: row.body,
        image_ref: row.image_ref,
        created_at: parse_timestamp(&row.created_at, "created_at"),
    }
}

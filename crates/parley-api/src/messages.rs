use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use parley_db::{Database, encode_timestamp, models::MessageRow};
use parley_types::api::{MessageResponse, SendMessageRequest};
use parley_types::events::GatewayEvent;

use crate::convert::message_response;
use crate::error::{ApiError, BANNED_FROM_CHANNEL, CHANNEL_NOT_FOUND, SENDER_NOT_FOUND};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination — pass the `created_at` of the oldest message
    /// from the previous page to fetch older messages.
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    50
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.clamp(1, 200);
    let before = query.before.as_deref().and_then(normalize_cursor);

    let db = state.db.clone();
    let cid = channel_id.to_string();
    let rows = tokio::task::spawn_blocking(move || db.get_messages(&cid, limit, before.as_deref()))
        .await
        .map_err(anyhow::Error::from)??;

    let messages: Vec<MessageResponse> = rows.into_iter().map(message_response).collect();
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let cid = channel_id.to_string();
    let row = tokio::task::spawn_blocking(move || {
        persist_message(
            &db,
            &cid,
            req.sender_id,
            req.sender_name.as_deref(),
            req.body.as_deref(),
            req.image_ref.as_deref(),
        )
    })
    .await
    .map_err(anyhow::Error::from)??;

    let message = message_response(row);

    // Broadcast only after the durable write succeeded, so fan-out order
    // matches persisted order. A failed broadcast does not fail the send —
    // the message is durable and appears on the next page load.
    state
        .rooms
        .broadcast_to_room(
            channel_id,
            GatewayEvent::MessageCreate {
                id: message.id,
                channel_id: message.channel_id,
                sender_id: message.sender_id,
                sender_name: message.sender_name.clone(),
                body: message.body.clone(),
                image_ref: message.image_ref.clone(),
                created_at: message.created_at,
            },
        )
        .await;
    state
        .rooms
        .broadcast_to_room(channel_id, GatewayEvent::MessageCountChanged { channel_id })
        .await;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Blocking core of the send path: validate, gate on the ban registry,
/// resolve the sender's display name, then write. A banned sender's message
/// never reaches the store; an invalid payload writes nothing.
pub(crate) fn persist_message(
    db: &Database,
    channel_id: &str,
    sender_id: Uuid,
    sender_name: Option<&str>,
    body: Option<&str>,
    image_ref: Option<&str>,
) -> Result<MessageRow, ApiError> {
    let body = body.map(str::trim).filter(|s| !s.is_empty());
    let image_ref = image_ref.map(str::trim).filter(|s| !s.is_empty());
    if body.is_none() && image_ref.is_none() {
        return Err(ApiError::InvalidPayload);
    }

    if db.get_channel(channel_id)?.is_none() {
        return Err(ApiError::NotFound(CHANNEL_NOT_FOUND));
    }

    let sid = sender_id.to_string();
    if db.is_banned(channel_id, &sid)? {
        return Err(ApiError::Forbidden(BANNED_FROM_CHANNEL));
    }

    let sender_name = match sender_name.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => name.to_string(),
        None => db
            .get_user(&sid)?
            .map(|u| u.username)
            .ok_or(ApiError::NotFound(SENDER_NOT_FOUND))?,
    };

    // Timestamp assigned here, never trusted from the client.
    let created_at = encode_timestamp(Utc::now());
    let id = db.insert_message(
        channel_id,
        &sid,
        &sender_name,
        body,
        image_ref,
        &created_at,
    )?;

    Ok(MessageRow {
        id,
        channel_id: channel_id.to_string(),
        sender_id: sid,
        sender_name,
        body: body.map(String::from),
        image_ref: image_ref.map(String::from),
        created_at,
    })
}

/// A malformed cursor is treated as "no cursor" rather than rejected — the
/// lenient behavior the surrounding clients rely on — but logged so client
/// bugs stay visible.
fn normalize_cursor(raw: &str) -> Option<String> {
    match raw.parse::<DateTime<Utc>>() {
        Ok(ts) => Some(encode_timestamp(ts)),
        Err(e) => {
            warn!("ignoring malformed pagination cursor '{}': {}", raw, e);
            None
        }
    }
}

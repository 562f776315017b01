use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use parley_db::{Database, encode_timestamp};
use parley_gateway::moderation;
use parley_types::api::{BanReport, BanResponse, CreateBanRequest, OkResponse};
use parley_types::models::Role;

use crate::convert::{parse_timestamp, parse_uuid};
use crate::error::{ACTOR_NOT_FOUND, ApiError, CHANNEL_NOT_FOUND, TARGET_NOT_FOUND};
use crate::policy::check_ban_allowed;
use crate::state::AppState;

pub async fn create_ban(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Json(req): Json<CreateBanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reason = req.reason.trim().to_string();
    if reason.is_empty() {
        return Err(ApiError::InvalidPayload);
    }

    let db = state.db.clone();
    let cid = channel_id.to_string();
    let created = tokio::task::spawn_blocking(move || {
        record_ban(&db, &cid, req.user_id, req.banned_by, &reason)
    })
    .await
    .map_err(anyhow::Error::from)??;

    // Eviction runs only for a newly created record, before this request
    // returns. Re-banning an already-banned user is a quiet success.
    if created {
        info!(
            "user {} banned from channel {} by {}",
            req.user_id, channel_id, req.banned_by
        );
        moderation::evict_banned(&state.rooms, channel_id, req.user_id).await;
    }

    Ok(Json(OkResponse { ok: true }))
}

pub async fn delete_ban(
    State(state): State<AppState>,
    Path((channel_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || {
        db.delete_ban(&channel_id.to_string(), &user_id.to_string())
    })
    .await
    .map_err(anyhow::Error::from)??;

    Ok(Json(OkResponse { ok: true }))
}

pub async fn list_bans(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.bans_for_channel(&channel_id.to_string()))
        .await
        .map_err(anyhow::Error::from)??;

    let bans: Vec<BanResponse> = rows
        .into_iter()
        .map(|row| BanResponse {
            user_id: parse_uuid(&row.user_id, "ban user_id"),
            reason: row.reason,
            banned_by: parse_uuid(&row.banned_by, "ban banned_by"),
            created_at: parse_timestamp(&row.created_at, "ban created_at"),
        })
        .collect();
    Ok(Json(bans))
}

pub async fn ban_reports(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.ban_reports())
        .await
        .map_err(anyhow::Error::from)??;

    let reports: Vec<BanReport> = rows
        .into_iter()
        .map(|row| BanReport {
            group_id: row.group_id.map(|id| parse_uuid(&id, "report group_id")),
            group_name: row.group_name,
            channel_id: parse_uuid(&row.channel_id, "report channel_id"),
            channel_name: row.channel_name,
            user_id: parse_uuid(&row.user_id, "report user_id"),
            username: row.username,
            banned_by: parse_uuid(&row.banned_by, "report banned_by"),
            banned_by_name: row.banned_by_name,
            reason: row.reason,
            created_at: parse_timestamp(&row.created_at, "report created_at"),
        })
        .collect();
    Ok(Json(reports))
}

/// Blocking core of ban creation: existence checks, role policy, then the
/// idempotent upsert. Returns whether a new record was created so the caller
/// triggers eviction exactly once per new ban.
pub(crate) fn record_ban(
    db: &Database,
    channel_id: &str,
    user_id: Uuid,
    banned_by: Uuid,
    reason: &str,
) -> Result<bool, ApiError> {
    if db.get_channel(channel_id)?.is_none() {
        return Err(ApiError::NotFound(CHANNEL_NOT_FOUND));
    }
    let target = db
        .get_user(&user_id.to_string())?
        .ok_or(ApiError::NotFound(TARGET_NOT_FOUND))?;
    let actor = db
        .get_user(&banned_by.to_string())?
        .ok_or(ApiError::NotFound(ACTOR_NOT_FOUND))?;

    check_ban_allowed(
        banned_by,
        Role::parse(&actor.role),
        user_id,
        Role::parse(&target.role),
    )?;

    let created = db.upsert_ban(
        channel_id,
        &user_id.to_string(),
        reason,
        &banned_by.to_string(),
        &encode_timestamp(Utc::now()),
    )?;
    Ok(created)
}

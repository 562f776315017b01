use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Error taxonomy for the request/response surface. Each variant carries a
/// stable machine-readable code surfaced as `{"error": "<code>"}`; a denied
/// join is NOT here — that is a normal gateway protocol outcome, not an
/// error.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request content; rejected before any write.
    #[error("invalid_payload")]
    InvalidPayload,

    /// Rejected by a business rule, with a specific reason code.
    #[error("{0}")]
    Forbidden(&'static str),

    /// A referenced channel/user does not exist.
    #[error("{0}")]
    NotFound(&'static str),

    /// Persistence failure or similar. Surfaced to the caller as-is; this
    /// subsystem does not retry.
    #[error("server_error")]
    Internal(#[from] anyhow::Error),
}

pub const BANNED_FROM_CHANNEL: &str = "banned_from_channel";
pub const CANNOT_BAN_SELF: &str = "cannot_ban_self";
pub const CANNOT_BAN_SUPER_ADMIN: &str = "cannot_ban_super_admin";
pub const ONLY_SUPER_CAN_BAN_GROUP_ADMIN: &str = "only_super_can_ban_group_admin";
pub const CHANNEL_NOT_FOUND: &str = "channel_not_found";
pub const TARGET_NOT_FOUND: &str = "target_not_found";
pub const ACTOR_NOT_FOUND: &str = "actor_not_found";
pub const SENDER_NOT_FOUND: &str = "sender_not_found";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidPayload => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(e) => {
                error!("request failed: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let code = self.to_string();
        (status, Json(json!({ "error": code }))).into_response()
    }
}

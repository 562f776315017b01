use uuid::Uuid;

use parley_types::models::Role;

use crate::error::{
    ApiError, CANNOT_BAN_SELF, CANNOT_BAN_SUPER_ADMIN, ONLY_SUPER_CAN_BAN_GROUP_ADMIN,
};

/// Business rules that must hold before a ban is recorded, consolidated in
/// one place rather than scattered at call sites:
///
/// - the actor cannot ban themselves;
/// - a SUPER_ADMIN target can never be banned;
/// - a GROUP_ADMIN target can only be banned by a SUPER_ADMIN.
///
/// Targets with an unknown or missing role count as ordinary users and are
/// bannable by any actor.
pub fn check_ban_allowed(
    actor_id: Uuid,
    actor_role: Role,
    target_id: Uuid,
    target_role: Role,
) -> Result<(), ApiError> {
    if actor_id == target_id {
        return Err(ApiError::Forbidden(CANNOT_BAN_SELF));
    }
    if target_role == Role::SuperAdmin {
        return Err(ApiError::Forbidden(CANNOT_BAN_SUPER_ADMIN));
    }
    if target_role == Role::GroupAdmin && actor_role != Role::SuperAdmin {
        return Err(ApiError::Forbidden(ONLY_SUPER_CAN_BAN_GROUP_ADMIN));
    }
    Ok(())
}

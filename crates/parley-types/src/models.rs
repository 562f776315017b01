use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity asserted by a client when joining a room. The gateway carries no
/// authentication handshake of its own — the surrounding system resolves
/// identity and the client is trusted to present it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: Uuid,
    pub username: String,
}

/// Administrative roles, stored as upper-case strings in the users table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    GroupAdmin,
    SuperAdmin,
}

impl Role {
    /// Unknown or missing role strings normalize to `User`, matching how the
    /// rest of the system treats accounts without an explicit role.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUPER_ADMIN" => Role::SuperAdmin,
            "GROUP_ADMIN" => Role::GroupAdmin,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::GroupAdmin => "GROUP_ADMIN",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }
}

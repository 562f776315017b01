pub mod bans;
pub mod error;
pub mod messages;
pub mod policy;
pub mod state;

pub(crate) mod convert;

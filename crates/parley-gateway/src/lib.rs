pub mod connection;
pub mod moderation;
pub mod registry;
pub mod rooms;

use std::sync::Arc;

use parley_db::Database;
use parley_gateway::rooms::RoomManager;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub rooms: RoomManager,
}

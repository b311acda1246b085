use std::sync::Arc;

use application::{RealtimeService, UserService};
use domain::MessageRepository;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub realtime: Arc<RealtimeService>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub jwt_service: Arc<JwtService>,
    /// HTTP 历史查询的条数上限
    pub history_limit: u32,
}

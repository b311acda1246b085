//! Web 层：HTTP 认证/历史接口与 WebSocket 实时会话入口。

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;
pub mod websocket;

pub use auth::{Claims, JwtService};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;

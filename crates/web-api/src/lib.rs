//! Web API 层。
//!
//! 提供 Axum 路由：便签 REST 接口、实时 WebSocket 频道与健康检查。

mod error;
mod routes;
mod state;
mod ws_connection;

pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;

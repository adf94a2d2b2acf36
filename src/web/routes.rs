//! 路由定义

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::web::{handlers, state::AppState};

/// 存活检查
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(handlers::health::health_check))
}

/// 提交与配置视图
pub fn job_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/batch-scores",
            get(handlers::jobs::get_config).post(handlers::jobs::submit),
        )
        .route("/api/batch-queue", post(handlers::jobs::enqueue))
}

/// 中继回调（路径可配置）
pub fn relay_routes(hop_path: &str) -> Router<Arc<AppState>> {
    Router::new().route(hop_path, post(handlers::relay::process_hop))
}

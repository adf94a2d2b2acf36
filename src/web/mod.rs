//! HTTP 入口层
//!
//! - `GET  /health` 存活检查
//! - `GET  /api/batch-scores` 配置视图
//! - `POST /api/batch-scores` 提交（自动选择同步/异步）
//! - `POST /api/batch-queue` 提交（强制异步）
//! - `POST /api/batch-processor` 中继回调，执行一跳

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

pub use errors::ApiError;
pub use state::AppState;

/// 创建带中间件的路由
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(routes::health_routes())
        .merge(routes::job_routes())
        .merge(routes::relay_routes(&state.config.hop_path))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    info!("🌐 路由已创建");
    app
}

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use batch_scorer::clients::{LlmClient, QStashRelay, ResendMailer};
use batch_scorer::utils::logging;
use batch_scorer::{create_app, AppState, Config};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load().context("加载配置失败")?;

    // 初始化日志
    logging::init(config.verbose_logging);
    logging::log_startup(&config);

    // 组装外部能力
    let backend = Arc::new(LlmClient::new(&config));
    let relay = Arc::new(QStashRelay::new(&config));
    let mailer = Arc::new(ResendMailer::new(&config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let state = Arc::new(AppState::new(config, backend, relay, mailer));
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("无法绑定端口 {}", addr))?;
    info!("✅ 服务已启动: http://{}", addr);

    axum::serve(listener, app).await.context("HTTP 服务异常退出")?;

    Ok(())
}

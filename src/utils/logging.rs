/// 日志工具模块
///
/// 提供日志初始化以及格式化输出的辅助函数
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::{Job, JobPhase};

/// 初始化日志
///
/// `RUST_LOG` 优先；否则按 `verbose` 选择 debug / info。
/// 重复初始化（例如测试中）会被忽略。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息（不输出任何密钥）
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 批量评分服务启动");
    info!("🌐 监听端口: {}", config.http_port);
    info!("🔁 中继回调: {}", config.hop_endpoint());
    info!(
        "📦 分块大小: {} | 同步阈值: {} | 单次上限: {}",
        config.chunk_size, config.sync_threshold, config.max_identifiers
    );
    info!(
        "⏱️ 分块间隔: {}s | 最大重试: {}",
        config.inter_chunk_delay_secs, config.scoring_max_retries
    );
    info!("🤖 默认模型: {}", config.default_model);
    info!("{}", "=".repeat(60));
}

/// 记录任务受理信息
///
/// # 参数
/// - `job`: 初始任务快照
/// - `total`: 标识符总数
/// - `estimated_time`: 预估耗时
pub fn log_job_accepted(job: &Job, total: usize, estimated_time: &str) {
    info!(
        "[任务 {}] 📥 {}: {} 个标识符，共 {} 个分块，预计 {}",
        job.job_id,
        JobPhase::Received,
        total,
        job.total_chunks(),
        estimated_time
    );
}

/// 记录一跳开始
pub fn log_hop_start(job: &Job) {
    info!("\n{}", "─".repeat(60));
    info!(
        "{} 📦 开始处理 ({} 个标识符，已累积 {} 条结果)",
        job,
        job.current_chunk().map(Vec::len).unwrap_or(0),
        job.accumulated.len()
    );
}

/// 记录一跳结束
pub fn log_hop_complete(job_id: &str, phase: JobPhase, accumulated: usize, tracked_jobs: usize) {
    let icon = match phase {
        JobPhase::Completed => "✅",
        JobPhase::Failed { .. } => "❌",
        _ => "✓",
    };
    info!(
        "[任务 {}] {} 本跳结束: {} (累积 {} 条)",
        job_id, icon, phase, accumulated
    );
    if phase.is_terminal() {
        info!("[任务 {}] 🏁 任务结束", job_id);
    }
    debug!("去重记录中的任务数: {}", tracked_jobs);
    info!("{}", "─".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

//! 中继回调

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::models::{Job, JobPhase};
use crate::orchestrator::HopReport;
use crate::web::errors::ApiError;
use crate::web::state::AppState;

/// 回执：只表示已收到，不代表任务结局
#[derive(Debug, Clone, Serialize)]
pub struct HopResponse {
    pub success: bool,
    pub job_id: String,
    pub phase: JobPhase,
    pub message: String,
    pub processed_count: usize,
    pub duplicate: bool,
}

impl From<HopReport> for HopResponse {
    fn from(report: HopReport) -> Self {
        Self {
            success: true,
            message: report.message(),
            job_id: report.job_id,
            phase: report.phase,
            processed_count: report.processed_count,
            duplicate: report.duplicate,
        }
    }
}

/// 执行一跳: POST /api/batch-processor
///
/// 快照合法时总是返回 200；任务的成功或失败通过邮件告知。
pub async fn process_hop(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Job>, JsonRejection>,
) -> Result<Json<HopResponse>, ApiError> {
    let Json(job) = payload?;
    let report = state.orchestrator.handle_hop(job).await?;
    Ok(Json(report.into()))
}

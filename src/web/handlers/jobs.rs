//! 提交入口与配置视图

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::models::ScoreResult;
use crate::orchestrator::{IntakeOutcome, ScoreRequest};
use crate::web::errors::ApiError;
use crate::web::state::AppState;

/// 配置视图（不含任何密钥）
#[derive(Debug, Clone, Serialize)]
pub struct ConfigResponse {
    pub batch_size_limit: usize,
    pub chunk_size: usize,
    pub sync_threshold: usize,
    pub default_model: String,
    pub available_models: Vec<String>,
}

/// 提交响应
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SubmitResponse {
    Completed {
        success: bool,
        results: Vec<ScoreResult>,
        processed_count: usize,
        timestamp: String,
    },
    Queued {
        success: bool,
        job_id: String,
        message: String,
        estimated_time: String,
        chunk_count: usize,
    },
}

impl From<IntakeOutcome> for SubmitResponse {
    fn from(outcome: IntakeOutcome) -> Self {
        match outcome {
            IntakeOutcome::Completed { results } => SubmitResponse::Completed {
                success: true,
                processed_count: results.len(),
                results,
                timestamp: Utc::now().to_rfc3339(),
            },
            IntakeOutcome::Queued {
                job_id,
                estimated_time,
                chunk_count,
                total,
            } => SubmitResponse::Queued {
                success: true,
                message: format!(
                    "Processing {} identifiers in {} chunks. Results will be emailed when complete.",
                    total, chunk_count
                ),
                job_id,
                estimated_time: estimated_time.to_string(),
                chunk_count,
            },
        }
    }
}

/// 配置视图: GET /api/batch-scores
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<ConfigResponse> {
    let config = &state.config;
    Json(ConfigResponse {
        batch_size_limit: config.max_identifiers,
        chunk_size: config.chunk_size,
        sync_threshold: config.sync_threshold,
        default_model: config.default_model.clone(),
        available_models: config.available_models.clone(),
    })
}

/// 提交: POST /api/batch-scores
///
/// 数量不超过同步阈值时直接返回结果，否则排队并返回任务 ID。
pub async fn submit(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ScoreRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(request) = payload?;
    let outcome = state.intake.submit(request).await?;
    Ok(Json(outcome.into()))
}

/// 强制异步提交: POST /api/batch-queue
pub async fn enqueue(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ScoreRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(request) = payload?;
    let outcome = state.intake.enqueue(request).await?;
    Ok(Json(outcome.into()))
}

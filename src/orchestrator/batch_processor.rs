//! 批量评分处理器 - 编排层
//!
//! ## 职责
//!
//! 处理中继投递的"一跳"：给任务快照中 cursor 指向的分块打分，
//! 合并结果，然后决定继续（把下一跳交给中继）还是结束（发终态邮件）。
//!
//! ## 状态机
//!
//! ```text
//! Received → Processing(c) ─┬─ 成功且还有分块 → Advancing(c+1) → (中继延迟) → Processing(c+1)
//!                           ├─ 成功且是最后一块 → Completed   (成功邮件)
//!                           └─ 失败             → Failed(c)   (失败邮件 + 部分结果)
//! ```
//!
//! ## 设计特点
//!
//! - **单块推进**：每个任务同一时刻最多一个分块在处理
//! - **不重试失败分块**：失败即终止，也不跳到下一块
//! - **不持有等待**：分块间的延迟完全交给中继
//! - **终态邮件只发一次**：邮件发送失败只记录日志

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::clients::DynRelay;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Job, JobPhase, ScoreResult};
use crate::orchestrator::hop_ledger::HopLedger;
use crate::services::{FailureReport, Notifier, Scorer};
use crate::utils::logging;

/// 一跳的处理结果（只是回执，不代表任务结局）
#[derive(Debug, Clone, Serialize)]
pub struct HopReport {
    pub job_id: String,
    pub phase: JobPhase,
    /// 本跳新增的结果数
    pub processed_count: usize,
    /// 目前累积的结果数
    pub accumulated: usize,
    pub total_chunks: usize,
    /// 是否为被忽略的重复投递
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HopReport {
    /// 简短的人类可读说明
    pub fn message(&self) -> String {
        match self.phase {
            _ if self.duplicate => "Duplicate delivery ignored".to_string(),
            JobPhase::Advancing { cursor } => format!(
                "Processed chunk {} of {}, queued chunk {}",
                cursor,
                self.total_chunks,
                cursor + 1
            ),
            JobPhase::Completed => format!(
                "Processed all {} chunks, {} results emailed",
                self.total_chunks, self.accumulated
            ),
            JobPhase::Failed { cursor } => format!(
                "Job failed at chunk {} of {}",
                cursor + 1,
                self.total_chunks
            ),
            phase => format!("Job is {}", phase),
        }
    }
}

/// 批量评分编排器
pub struct BatchOrchestrator {
    scorer: Arc<Scorer>,
    relay: DynRelay,
    notifier: Arc<Notifier>,
    ledger: HopLedger,
    hop_endpoint: String,
    inter_chunk_delay: Duration,
    chunk_size: usize,
    available_models: Vec<String>,
}

impl BatchOrchestrator {
    pub fn new(
        config: &Config,
        scorer: Arc<Scorer>,
        relay: DynRelay,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            scorer,
            relay,
            notifier,
            ledger: HopLedger::new(Duration::from_secs(config.hop_ledger_ttl_secs)),
            hop_endpoint: config.hop_endpoint(),
            inter_chunk_delay: Duration::from_secs(config.inter_chunk_delay_secs),
            chunk_size: config.chunk_size,
            available_models: config.available_models.clone(),
        }
    }

    /// 处理一跳
    ///
    /// 只有快照本身不合法时返回错误；评分、中继、邮件的失败都体现在
    /// 返回的 `HopReport` 里。
    pub async fn handle_hop(&self, job: Job) -> AppResult<HopReport> {
        job.validate_for_hop().map_err(AppError::from)?;
        job.validate_limits(self.chunk_size, &self.available_models)
            .map_err(AppError::from)?;

        let total_chunks = job.total_chunks();
        let cursor = job.cursor;

        if !self.ledger.observe(&job.job_id, cursor) {
            warn!("{} ⚠️ 重复投递 ({})，已忽略", job, job.idempotency_key());
            return Ok(HopReport {
                job_id: job.job_id,
                phase: JobPhase::Processing { cursor },
                processed_count: 0,
                accumulated: job.accumulated.len(),
                total_chunks,
                duplicate: true,
                error: None,
            });
        }

        logging::log_hop_start(&job);

        let report = match self.process_current_chunk(&job).await {
            Ok(results) => self.on_chunk_success(job, results).await,
            Err(err) => {
                let message = err.to_string();
                error!("{} ❌ 分块评分失败: {}", job, message);
                self.notify_failure(&job, &err, cursor).await;
                HopReport {
                    job_id: job.job_id.clone(),
                    phase: JobPhase::Failed { cursor },
                    processed_count: 0,
                    accumulated: job.accumulated.len(),
                    total_chunks,
                    duplicate: false,
                    error: Some(message),
                }
            }
        };

        logging::log_hop_complete(
            &report.job_id,
            report.phase,
            report.accumulated,
            self.ledger.tracked_jobs(),
        );
        Ok(report)
    }

    async fn process_current_chunk(&self, job: &Job) -> AppResult<Vec<ScoreResult>> {
        let chunk = job
            .current_chunk()
            .ok_or_else(|| AppError::malformed_job(&job.job_id, "no chunk at cursor"))?;

        Ok(self.scorer.score_chunk(chunk, &job.model, job.mode).await?)
    }

    async fn on_chunk_success(&self, job: Job, results: Vec<ScoreResult>) -> HopReport {
        let processed_count = results.len();
        let total_chunks = job.total_chunks();
        let next = job.advance(results);

        info!(
            "[任务 {}] ✓ 分块 {}/{} 完成，本块 {} 条，累积 {} 条",
            next.job_id,
            next.cursor,
            total_chunks,
            processed_count,
            next.accumulated.len()
        );

        if next.is_finished() {
            info!(
                "[任务 {}] 🎉 全部分块完成，发送结果邮件至 {}",
                next.job_id, next.destination
            );
            if let Err(e) = self
                .notifier
                .send_success(&next.destination, &next.accumulated, &next.job_id)
                .await
            {
                error!("[任务 {}] ❌ 结果邮件发送失败: {}", next.job_id, e);
            }
            return HopReport {
                job_id: next.job_id,
                phase: JobPhase::Completed,
                processed_count,
                accumulated: next.accumulated.len(),
                total_chunks,
                duplicate: false,
                error: None,
            };
        }

        match self.enqueue_next(&next).await {
            Ok(()) => {
                info!(
                    "[任务 {}] 🔁 已排队分块 {}/{} ({}s 后执行)",
                    next.job_id,
                    next.cursor + 1,
                    total_chunks,
                    self.inter_chunk_delay.as_secs()
                );
                HopReport {
                    job_id: next.job_id,
                    phase: JobPhase::Advancing {
                        cursor: next.cursor,
                    },
                    processed_count,
                    accumulated: next.accumulated.len(),
                    total_chunks,
                    duplicate: false,
                    error: None,
                }
            }
            Err(err) => {
                let message = err.to_string();
                error!("[任务 {}] ❌ 下一跳排队失败: {}", next.job_id, message);
                self.notify_failure(&next, &err, next.cursor).await;
                HopReport {
                    job_id: next.job_id.clone(),
                    phase: JobPhase::Failed {
                        cursor: next.cursor,
                    },
                    processed_count,
                    accumulated: next.accumulated.len(),
                    total_chunks,
                    duplicate: false,
                    error: Some(message),
                }
            }
        }
    }

    async fn enqueue_next(&self, next: &Job) -> AppResult<()> {
        let payload = serde_json::to_value(next).map_err(crate::error::RelayError::from)?;
        self.relay
            .enqueue(&self.hop_endpoint, &payload, Some(self.inter_chunk_delay))
            .await?;
        Ok(())
    }

    /// 发送失败邮件；发送本身失败只记录日志
    async fn notify_failure(&self, job: &Job, err: &AppError, failed_chunk: usize) {
        let report = FailureReport {
            destination: &job.destination,
            job_id: &job.job_id,
            error_message: err.to_string(),
            remediation: err.remediation(),
            partial_results: &job.accumulated,
            failed_chunk,
            total_chunks: job.total_chunks(),
        };

        if let Err(e) = self.notifier.send_failure(&report).await {
            error!("[任务 {}] ❌ 失败通知发送失败: {}", job.job_id, e);
        }
    }
}

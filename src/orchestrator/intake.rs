//! 请求受理 - 编排层入口
//!
//! 校验并规范化提交的标识符，然后决定走同步路径（直接评分并返回结果）
//! 还是异步路径（规划分块、生成任务快照、交给中继执行第一跳）。

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;
use tracing::{error, info};

use crate::clients::DynRelay;
use crate::config::Config;
use crate::error::{AppError, AppResult, InputError, RelayError};
use crate::models::{new_job_id, Job, ScoreResult, ScoringMode};
use crate::services::{ChunkPlan, FailureReport, Notifier, Scorer};
use crate::utils::logging;

static TICKER_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,\s]+").expect("ticker separator regex"));
static ENTITY_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,\n;]+").expect("entity separator regex"));
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex")
});

/// 提交请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScoreRequest {
    #[serde(alias = "tickers")]
    pub identifiers: Vec<String>,
    /// 原始文本输入，与 `identifiers` 合并
    pub input: Option<String>,
    pub model: Option<String>,
    pub email: Option<String>,
    pub mode: ScoringMode,
}

/// 受理结果
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    /// 同步路径：结果直接返回
    Completed { results: Vec<ScoreResult> },
    /// 异步路径：任务已交给中继
    Queued {
        job_id: String,
        estimated_time: &'static str,
        chunk_count: usize,
        total: usize,
    },
}

/// 请求受理
pub struct Intake {
    config: Arc<Config>,
    scorer: Arc<Scorer>,
    relay: DynRelay,
    notifier: Arc<Notifier>,
}

impl Intake {
    pub fn new(
        config: Arc<Config>,
        scorer: Arc<Scorer>,
        relay: DynRelay,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            config,
            scorer,
            relay,
            notifier,
        }
    }

    /// 按数量自动选择同步或异步路径
    pub async fn submit(&self, request: ScoreRequest) -> AppResult<IntakeOutcome> {
        let identifiers = self.checked_identifiers(&request)?;
        let model = self.resolve_model(request.model.as_deref())?;

        if identifiers.len() <= self.config.sync_threshold {
            info!(
                "⚡ 同步评分 {} 个标识符 (模型: {}, 模式: {})",
                identifiers.len(),
                model,
                request.mode
            );
            let results = self
                .scorer
                .score_chunk(&identifiers, &model, request.mode)
                .await?;
            info!("✅ 同步评分完成，返回 {} 条结果", results.len());
            return Ok(IntakeOutcome::Completed { results });
        }

        let destination = self.checked_destination(request.email.as_deref())?;
        self.start_job(identifiers, model, destination, request.mode)
            .await
    }

    /// 不论数量都走异步路径
    pub async fn enqueue(&self, request: ScoreRequest) -> AppResult<IntakeOutcome> {
        let identifiers = self.checked_identifiers(&request)?;
        let model = self.resolve_model(request.model.as_deref())?;
        let destination = self.checked_destination(request.email.as_deref())?;

        self.start_job(identifiers, model, destination, request.mode)
            .await
    }

    fn checked_identifiers(&self, request: &ScoreRequest) -> Result<Vec<String>, InputError> {
        let identifiers = normalize_identifiers(
            &request.identifiers,
            request.input.as_deref(),
            request.mode,
        );

        if identifiers.is_empty() {
            return Err(InputError::NoIdentifiers);
        }
        if identifiers.len() > self.config.max_identifiers {
            return Err(InputError::TooManyIdentifiers {
                count: identifiers.len(),
                limit: self.config.max_identifiers,
            });
        }
        Ok(identifiers)
    }

    fn resolve_model(&self, requested: Option<&str>) -> Result<String, InputError> {
        match requested.map(str::trim).filter(|m| !m.is_empty()) {
            None => Ok(self.config.default_model.clone()),
            Some(model) if self.config.available_models.iter().any(|m| m == model) => {
                Ok(model.to_string())
            }
            Some(model) => Err(InputError::UnknownModel {
                model: model.to_string(),
            }),
        }
    }

    fn checked_destination(&self, email: Option<&str>) -> Result<String, InputError> {
        let address = email.map(str::trim).unwrap_or_default();
        if address.is_empty() {
            return Err(InputError::MissingDestination {
                threshold: self.config.sync_threshold,
            });
        }
        if !is_valid_email(address) {
            return Err(InputError::InvalidDestination {
                address: address.to_string(),
            });
        }
        Ok(address.to_string())
    }

    async fn start_job(
        &self,
        identifiers: Vec<String>,
        model: String,
        destination: String,
        mode: ScoringMode,
    ) -> AppResult<IntakeOutcome> {
        let plan = ChunkPlan::new(&identifiers, self.config.chunk_size);
        let total = plan.total_identifiers();
        let estimated_time = plan.estimated_time;
        let job = Job::new(new_job_id(), plan.chunks, model, destination, mode);
        logging::log_job_accepted(&job, total, estimated_time);

        if let Err(err) = self.enqueue_first_hop(&job).await {
            error!("[任务 {}] ❌ 首跳排队失败: {}", job.job_id, err);
            let report = FailureReport {
                destination: &job.destination,
                job_id: &job.job_id,
                error_message: err.to_string(),
                remediation: err.remediation(),
                partial_results: &[],
                failed_chunk: 0,
                total_chunks: job.total_chunks(),
            };
            if let Err(e) = self.notifier.send_failure(&report).await {
                error!("[任务 {}] ❌ 失败通知发送失败: {}", job.job_id, e);
            }
            return Err(err);
        }

        Ok(IntakeOutcome::Queued {
            chunk_count: job.total_chunks(),
            job_id: job.job_id,
            estimated_time,
            total,
        })
    }

    async fn enqueue_first_hop(&self, job: &Job) -> AppResult<()> {
        let payload = serde_json::to_value(job).map_err(RelayError::from)?;
        self.relay
            .enqueue(&self.config.hop_endpoint(), &payload, None)
            .await
            .map_err(AppError::from)
    }
}

/// 合并、切分、规范化并去重标识符（保持首次出现的顺序）
pub fn normalize_identifiers(
    identifiers: &[String],
    input: Option<&str>,
    mode: ScoringMode,
) -> Vec<String> {
    let separators = match mode {
        ScoringMode::TickerOnly => &*TICKER_SEPARATORS,
        ScoringMode::AnyEntity => &*ENTITY_SEPARATORS,
    };

    let from_text = input.into_iter().flat_map(|text| separators.split(text));

    let mut seen = HashSet::new();
    identifiers
        .iter()
        .map(String::as_str)
        .chain(from_text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if mode.uppercases_input() {
                s.to_uppercase()
            } else {
                s.to_string()
            }
        })
        .filter(|s| seen.insert(s.to_lowercase()))
        .collect()
}

/// 粗略的邮箱格式检查：`local@domain.tld`
pub fn is_valid_email(address: &str) -> bool {
    EMAIL.is_match(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_tickers_from_text() {
        let out = normalize_identifiers(
            &strings(&["aapl"]),
            Some("msft, AAPL\ngoog  tsla,,"),
            ScoringMode::TickerOnly,
        );
        assert_eq!(out, strings(&["AAPL", "MSFT", "GOOG", "TSLA"]));
    }

    #[test]
    fn test_normalize_entities_keeps_spaces_and_case() {
        let out = normalize_identifiers(
            &[],
            Some("Acme Robotics; Globex Corp\nacme robotics, Initech"),
            ScoringMode::AnyEntity,
        );
        assert_eq!(out, strings(&["Acme Robotics", "Globex Corp", "Initech"]));
    }

    #[test]
    fn test_normalize_drops_blank_entries() {
        let out = normalize_identifiers(&strings(&["  ", ""]), None, ScoringMode::TickerOnly);
        assert!(out.is_empty());
    }

    #[test]
    fn test_email_check() {
        assert!(is_valid_email("analyst@example.com"));
        assert!(!is_valid_email("analyst@example"));
        assert!(!is_valid_email("analyst example.com"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn test_request_accepts_tickers_alias() {
        let request: ScoreRequest =
            serde_json::from_str(r#"{"tickers": ["AAPL"], "email": "a@b.co"}"#).unwrap();
        assert_eq!(request.identifiers, strings(&["AAPL"]));
        assert_eq!(request.mode, ScoringMode::TickerOnly);
        assert!(request.model.is_none());
    }
}

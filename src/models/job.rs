//! 任务快照
//!
//! 任务状态只存在于中继消息中：每一跳读入一个快照，产出下一个快照。

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::models::score::{ScoreResult, ScoringMode};

/// 一个分块：原始输入中连续、非空、有上限的一段标识符
pub type Chunk = Vec<String>;

/// 任务快照（即中继负载）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: String,

    #[serde(rename = "batches")]
    pub chunks: Vec<Chunk>,

    pub model: String,

    #[serde(rename = "email")]
    pub destination: String,

    #[serde(default)]
    pub mode: ScoringMode,

    /// 下一个待处理分块的下标（从 0 开始）
    #[serde(rename = "currentBatch")]
    pub cursor: usize,

    /// 目前已累积的结果
    #[serde(rename = "results", default)]
    pub accumulated: Vec<ScoreResult>,
}

impl Job {
    /// 创建初始快照（cursor = 0，结果为空）
    pub fn new(
        job_id: impl Into<String>,
        chunks: Vec<Chunk>,
        model: impl Into<String>,
        destination: impl Into<String>,
        mode: ScoringMode,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            chunks,
            model: model.into(),
            destination: destination.into(),
            mode,
            cursor: 0,
            accumulated: Vec::new(),
        }
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// 当前要处理的分块
    pub fn current_chunk(&self) -> Option<&Chunk> {
        self.chunks.get(self.cursor)
    }

    /// 所有分块是否都已处理
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.chunks.len()
    }

    /// 合并本跳结果并前进一格，返回新快照
    pub fn advance(mut self, results: Vec<ScoreResult>) -> Self {
        self.accumulated.extend(results);
        self.cursor += 1;
        self
    }

    /// 去重键：job_id + cursor
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.job_id, self.cursor)
    }

    /// 校验一跳的入参快照
    ///
    /// 要求至少还有一个分块待处理，因此 cursor 必须严格小于分块数。
    pub fn validate_for_hop(&self) -> Result<(), InputError> {
        let malformed = |reason: String| InputError::MalformedJob {
            job_id: self.job_id.clone(),
            reason,
        };

        if self.job_id.trim().is_empty() {
            return Err(malformed("job id is empty".into()));
        }
        if self.chunks.is_empty() {
            return Err(malformed("job has no chunks".into()));
        }
        if let Some(index) = self.chunks.iter().position(|c| c.is_empty()) {
            return Err(malformed(format!("chunk {} is empty", index)));
        }
        if self.cursor >= self.chunks.len() {
            return Err(malformed(format!(
                "cursor {} is out of range for {} chunks",
                self.cursor,
                self.chunks.len()
            )));
        }
        if self.destination.trim().is_empty() {
            return Err(malformed("destination is empty".into()));
        }

        // 累积结果只能来自 cursor 之前的分块
        let processed: usize = self.chunks[..self.cursor].iter().map(Vec::len).sum();
        if self.accumulated.len() > processed {
            return Err(malformed(format!(
                "{} results exceed the {} identifiers in chunks before {}",
                self.accumulated.len(),
                processed,
                self.cursor
            )));
        }
        if let Some((index, result)) = self
            .accumulated
            .iter()
            .enumerate()
            .find(|(_, r)| !r.scores_in_range())
        {
            return Err(malformed(format!(
                "result {} ({}) has a score outside [1, 10]",
                index, result.identifier
            )));
        }
        Ok(())
    }

    /// 按部署配置校验：分块不超过 `chunk_size`，模型在可用列表中
    pub fn validate_limits(
        &self,
        chunk_size: usize,
        available_models: &[String],
    ) -> Result<(), InputError> {
        if let Some(index) = self.chunks.iter().position(|c| c.len() > chunk_size) {
            return Err(InputError::MalformedJob {
                job_id: self.job_id.clone(),
                reason: format!(
                    "chunk {} has {} identifiers, limit is {}",
                    index,
                    self.chunks[index].len(),
                    chunk_size
                ),
            });
        }
        if !available_models.iter().any(|m| m == &self.model) {
            return Err(InputError::UnknownModel {
                model: self.model.clone(),
            });
        }
        Ok(())
    }
}

impl Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[任务 {} 分块 {}/{}]",
            self.job_id,
            (self.cursor + 1).min(self.chunks.len()),
            self.chunks.len()
        )
    }
}

/// 生成任务 ID：`job_<毫秒时间戳>_<8 位随机十六进制>`
pub fn new_job_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "job_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        &suffix[..8]
    )
}

/// 任务状态机的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobPhase {
    /// 刚完成分块，cursor = 0
    Received,
    /// 正在处理 cursor 指向的分块
    Processing { cursor: usize },
    /// 已把下一跳交给中继
    Advancing { cursor: usize },
    /// 全部分块成功
    Completed,
    /// 在 cursor 处失败
    Failed { cursor: usize },
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed { .. })
    }
}

impl Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Received => write!(f, "received"),
            JobPhase::Processing { cursor } => write!(f, "processing({})", cursor),
            JobPhase::Advancing { cursor } => write!(f, "advancing({})", cursor),
            JobPhase::Completed => write!(f, "completed"),
            JobPhase::Failed { cursor } => write!(f, "failed({})", cursor),
        }
    }
}

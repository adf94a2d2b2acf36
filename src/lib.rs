//! # Batch Scorer
//!
//! 一个把大批量标识符（股票代码或任意实体名）交给 LLM 打分，
//! 并通过邮件发送结果的服务
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 外部能力层（Clients）
//! - `clients/` - 三个外部能力的薄封装，各自藏在一个 trait 之后
//! - `LlmClient` - 评分能力（OpenAI 兼容接口）
//! - `QStashRelay` - 延迟投递能力
//! - `ResendMailer` - 邮件能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个分块
//! - `ChunkPlan` - 分块规划与耗时预估
//! - `Scorer` - 单个分块评分 + 响应校验
//! - `Notifier` - 成功/失败邮件
//!
//! ### ③ 编排层（Orchestration）
//! - `orchestrator/intake` - 受理请求，选择同步或异步路径
//! - `orchestrator/batch_processor` - 执行一跳，推进任务状态机
//!
//! ### ④ 入口层（Web）
//! - `web/` - axum 路由与错误映射
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod web;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{Job, JobPhase, ScoreResult, ScoringMode};
pub use orchestrator::{BatchOrchestrator, Intake, IntakeOutcome, ScoreRequest};
pub use web::{create_app, AppState};

//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责受理请求和推进任务，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `intake` - 请求受理
//! - 规范化、去重、校验标识符
//! - 小批量走同步路径，直接返回结果
//! - 大批量规划分块并提交第一跳
//!
//! ### `batch_processor` - 单跳处理器
//! - 给 cursor 指向的分块打分并合并结果
//! - 通过中继延迟投递下一跳
//! - 终态时发送成功或失败邮件
//!
//! ### `hop_ledger` - 去重记录
//! - 拒绝同一任务的重复或过期投递
//!
//! ## 层次关系
//!
//! ```text
//! web (HTTP 入口)
//!     ↓
//! intake / batch_processor (处理 Job)
//!     ↓
//! services (能力层：chunk_planner / scorer / notifier)
//!     ↓
//! clients (外部能力：LLM / 中继 / 邮件)
//! ```
//!
//! ## 设计原则
//!
//! 1. **无进程内状态**：任务状态只存在于中继负载中
//! 2. **向下依赖**：编排层 → services → clients
//! 3. **失败先通知**：任何失败路径返回前都先尝试发送失败邮件

pub mod batch_processor;
pub mod hop_ledger;
pub mod intake;

// 重新导出主要类型
pub use batch_processor::{BatchOrchestrator, HopReport};
pub use hop_ledger::HopLedger;
pub use intake::{normalize_identifiers, Intake, IntakeOutcome, ScoreRequest};

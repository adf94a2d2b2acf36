use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 请求参数错误（在任何外部调用之前拒绝）
    #[error(transparent)]
    Input(#[from] InputError),
    /// 评分相关错误（分块级别）
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    /// 中继投递错误
    #[error(transparent)]
    Relay(#[from] RelayError),
    /// 邮件通知错误
    #[error(transparent)]
    Notify(#[from] NotifyError),
    /// 配置错误
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppError {
    /// 稳定的错误分类标签，用于 API 响应和日志
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Input(_) => "input_invalid",
            AppError::Scoring(e) => e.kind(),
            AppError::Relay(_) => "relay_delivery_failed",
            AppError::Notify(_) => "notification_delivery_failed",
            AppError::Config(_) => "config_invalid",
        }
    }

    /// 面向用户的补救建议
    pub fn remediation(&self) -> &'static str {
        match self {
            AppError::Input(_) => "Check the request and submit again.",
            AppError::Scoring(e) => e.remediation(),
            AppError::Relay(_) => "The job could not be queued. Please try again shortly.",
            AppError::Notify(_) => "The result email could not be delivered.",
            AppError::Config(_) => "The service is misconfigured. Please contact support.",
        }
    }
}

/// 请求参数错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    /// 没有任何标识符
    #[error("At least one ticker or company name is required")]
    NoIdentifiers,
    /// 标识符数量超过上限
    #[error("Too many identifiers: {count} submitted, maximum is {limit}")]
    TooManyIdentifiers { count: usize, limit: usize },
    /// 异步路径缺少邮箱
    #[error("An email address is required for batches larger than {threshold} identifiers")]
    MissingDestination { threshold: usize },
    /// 邮箱格式不正确
    #[error("Invalid email address: {address}")]
    InvalidDestination { address: String },
    /// 不支持的模型
    #[error("Unsupported model: {model}")]
    UnknownModel { model: String },
    /// 中继消息中的任务快照不满足不变量
    #[error("Malformed job snapshot {job_id}: {reason}")]
    MalformedJob { job_id: String, reason: String },
}

/// 评分错误（Scorer Adapter 的分类结果）
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoringError {
    /// 上游返回内容无法解析或结构不对
    #[error("Failed to parse AI response: {reason}")]
    BadUpstreamFormat { reason: String, excerpt: String },
    /// 返回数量不足
    #[error("Incomplete results: received {returned} of {requested} (missing: {})", .missing.join(", "))]
    IncompleteResults {
        requested: usize,
        returned: usize,
        /// 缺失的标识符，最多 10 个
        missing: Vec<String>,
    },
    /// 记录字段不合法
    #[error("Invalid score data in record {index}: {reason}")]
    InvalidScoreData {
        index: usize,
        reason: String,
        excerpt: String,
    },
    /// 上游限流
    #[error("Analysis service rate limited (retry after: {retry_after:?}s): {message}")]
    UpstreamRateLimited {
        retry_after: Option<u64>,
        message: String,
    },
    /// 凭证无效
    #[error("Analysis service rejected the credentials: {message}")]
    CredentialInvalid { message: String },
    /// 上游不可用（5xx / 网络）
    #[error("Analysis service temporarily unavailable (status: {status:?}): {message}")]
    UpstreamUnavailable {
        status: Option<u16>,
        message: String,
    },
    /// 其他非 2xx 响应
    #[error("Analysis service error (status: {status:?}): {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },
}

impl ScoringError {
    /// 根据上游 HTTP 状态码分类
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<u64>) -> Self {
        let message = message.into();
        match status {
            429 => ScoringError::UpstreamRateLimited {
                retry_after,
                message,
            },
            401 => ScoringError::CredentialInvalid { message },
            500..=599 => ScoringError::UpstreamUnavailable {
                status: Some(status),
                message,
            },
            _ => ScoringError::Upstream {
                status: Some(status),
                message,
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScoringError::BadUpstreamFormat { .. } => "bad_upstream_format",
            ScoringError::IncompleteResults { .. } => "incomplete_results",
            ScoringError::InvalidScoreData { .. } => "invalid_score_data",
            ScoringError::UpstreamRateLimited { .. } => "upstream_rate_limited",
            ScoringError::CredentialInvalid { .. } => "credential_invalid",
            ScoringError::UpstreamUnavailable { .. } => "upstream_unavailable",
            ScoringError::Upstream { .. } => "upstream_error",
        }
    }

    /// 是否属于可重试的瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScoringError::UpstreamRateLimited { .. } | ScoringError::UpstreamUnavailable { .. }
        )
    }

    pub fn remediation(&self) -> &'static str {
        match self {
            ScoringError::BadUpstreamFormat { .. } | ScoringError::InvalidScoreData { .. } => {
                "The AI returned an unusable answer. Please try again."
            }
            ScoringError::IncompleteResults { .. } => {
                "Some identifiers were not scored. Please try again with a smaller batch."
            }
            ScoringError::UpstreamRateLimited { .. } => {
                "The analysis service is busy. Please wait a minute and resubmit, or use a smaller batch."
            }
            ScoringError::CredentialInvalid { .. } => {
                "API configuration error. Please contact support."
            }
            ScoringError::UpstreamUnavailable { .. } | ScoringError::Upstream { .. } => {
                "Analysis service temporarily unavailable. Please try again."
            }
        }
    }

    /// 原始响应摘录（若有）
    pub fn excerpt(&self) -> Option<&str> {
        match self {
            ScoringError::BadUpstreamFormat { excerpt, .. }
            | ScoringError::InvalidScoreData { excerpt, .. } => Some(excerpt.as_str()),
            _ => None,
        }
    }
}

/// 中继投递错误
#[derive(Debug, Error)]
pub enum RelayError {
    /// 网络请求失败
    #[error("Failed to enqueue next step at {endpoint}: {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// 中继服务拒绝了请求
    #[error("Relay rejected enqueue to {endpoint} (status {status}): {message}")]
    Rejected {
        endpoint: String,
        status: u16,
        message: String,
    },
    /// 负载序列化失败
    #[error("Failed to serialize relay payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 邮件通知错误
#[derive(Debug, Error)]
pub enum NotifyError {
    /// 网络请求失败
    #[error("Email request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// 邮件服务返回错误
    #[error("Email send failed (status {status}): {message}")]
    Rejected { status: u16, message: String },
    /// 附件渲染失败
    #[error("Failed to render attachment: {0}")]
    Render(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("Environment variable {var_name} has invalid value '{value}', expected {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取失败
    #[error("Failed to read config file {path}: {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("Failed to parse config file {path}: {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 配置值不合法
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建任务快照不合法错误
    pub fn malformed_job(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Input(InputError::MalformedJob {
            job_id: job_id.into(),
            reason: reason.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

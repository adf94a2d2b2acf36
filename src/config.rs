use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConfigError;

/// 默认配置文件名
const DEFAULT_CONFIG_FILE: &str = "batch_scorer.toml";

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP 监听端口
    pub http_port: u16,
    /// 对外可访问的基础 URL，中继会回调 `{public_base_url}{hop_path}`
    pub public_base_url: String,
    /// 中继回调路径
    pub hop_path: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub default_model: String,
    pub available_models: Vec<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    // --- 分块与调度 ---
    /// 每个分块的最大标识符数量（C）
    pub chunk_size: usize,
    /// 不超过该数量时走同步路径
    pub sync_threshold: usize,
    /// 单次请求允许的最大标识符数量
    pub max_identifiers: usize,
    /// 分块之间的中继延迟（秒）
    pub inter_chunk_delay_secs: u64,
    /// 瞬时错误的最大重试次数，0 表示不重试
    pub scoring_max_retries: u32,
    /// 首次重试前的等待（毫秒），之后每次翻倍
    pub scoring_retry_backoff_ms: u64,
    /// 中继去重记录保留时间（秒）
    pub hop_ledger_ttl_secs: u64,
    // --- 中继服务 ---
    pub relay_base_url: String,
    pub relay_token: String,
    // --- 邮件服务 ---
    pub mail_api_base_url: String,
    pub mail_api_key: String,
    pub mail_from: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 8080,
            public_base_url: "http://localhost:8080".to_string(),
            hop_path: "/api/batch-processor".to_string(),
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.anthropic.com/v1".to_string(),
            default_model: "claude-3-5-sonnet-20241022".to_string(),
            available_models: vec![
                "claude-3-5-sonnet-20241022".to_string(),
                "claude-3-opus-20240229".to_string(),
                "claude-3-sonnet-20240229".to_string(),
            ],
            max_tokens: 2000,
            temperature: 0.3,
            chunk_size: 15,
            sync_threshold: 25,
            max_identifiers: 500,
            inter_chunk_delay_secs: 30,
            scoring_max_retries: 0,
            scoring_retry_backoff_ms: 2000,
            hop_ledger_ttl_secs: 86_400,
            relay_base_url: "https://qstash.upstash.io".to_string(),
            relay_token: String::new(),
            mail_api_base_url: "https://api.resend.com".to_string(),
            mail_api_key: String::new(),
            mail_from: "Batch Analyzer <onboarding@resend.dev>".to_string(),
        }
    }
}

impl Config {
    /// 加载配置：.env → TOML 文件（可选）→ 环境变量覆盖 → 校验
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let base = match std::env::var("BATCH_SCORER_CONFIG") {
            Ok(path) => Self::from_toml_file(&path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_toml_file(DEFAULT_CONFIG_FILE)?
            }
            Err(_) => Self::default(),
        };

        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件读取，缺省字段使用默认值
    pub fn from_toml_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    fn from_toml_str(content: &str, path: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.to_string(),
            source,
        })
    }

    /// 只读取环境变量（其余使用默认值）
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(self) -> Result<Self, ConfigError> {
        Ok(Self {
            http_port: env_parse("HTTP_PORT", self.http_port)?,
            public_base_url: std::env::var("PUBLIC_BASE_URL").unwrap_or(self.public_base_url),
            hop_path: std::env::var("HOP_PATH").unwrap_or(self.hop_path),
            verbose_logging: env_parse("VERBOSE_LOGGING", self.verbose_logging)?,
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(self.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            default_model: std::env::var("DEFAULT_MODEL").unwrap_or(self.default_model),
            available_models: std::env::var("AVAILABLE_MODELS")
                .map(|v| {
                    v.split(',')
                        .map(|m| m.trim().to_string())
                        .filter(|m| !m.is_empty())
                        .collect()
                })
                .unwrap_or(self.available_models),
            max_tokens: env_parse("LLM_MAX_TOKENS", self.max_tokens)?,
            temperature: env_parse("LLM_TEMPERATURE", self.temperature)?,
            chunk_size: env_parse("CHUNK_SIZE", self.chunk_size)?,
            sync_threshold: env_parse("SYNC_THRESHOLD", self.sync_threshold)?,
            max_identifiers: env_parse("MAX_IDENTIFIERS", self.max_identifiers)?,
            inter_chunk_delay_secs: env_parse("INTER_CHUNK_DELAY_SECS", self.inter_chunk_delay_secs)?,
            scoring_max_retries: env_parse("SCORING_MAX_RETRIES", self.scoring_max_retries)?,
            scoring_retry_backoff_ms: env_parse(
                "SCORING_RETRY_BACKOFF_MS",
                self.scoring_retry_backoff_ms,
            )?,
            hop_ledger_ttl_secs: env_parse("HOP_LEDGER_TTL_SECS", self.hop_ledger_ttl_secs)?,
            relay_base_url: std::env::var("RELAY_BASE_URL").unwrap_or(self.relay_base_url),
            relay_token: std::env::var("RELAY_TOKEN").unwrap_or(self.relay_token),
            mail_api_base_url: std::env::var("MAIL_API_BASE_URL").unwrap_or(self.mail_api_base_url),
            mail_api_key: std::env::var("MAIL_API_KEY").unwrap_or(self.mail_api_key),
            mail_from: std::env::var("EMAIL_FROM").unwrap_or(self.mail_from),
        })
    }

    /// 校验配置之间的约束
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be at least 1".into()));
        }
        if self.sync_threshold == 0 {
            return Err(ConfigError::Invalid("sync_threshold must be at least 1".into()));
        }
        if self.max_identifiers < self.sync_threshold {
            return Err(ConfigError::Invalid(format!(
                "max_identifiers ({}) must not be below sync_threshold ({})",
                self.max_identifiers, self.sync_threshold
            )));
        }
        if !self.available_models.contains(&self.default_model) {
            return Err(ConfigError::Invalid(format!(
                "default_model '{}' is not listed in available_models",
                self.default_model
            )));
        }
        if !(self.public_base_url.starts_with("http://")
            || self.public_base_url.starts_with("https://"))
        {
            return Err(ConfigError::Invalid(format!(
                "public_base_url '{}' must be an http(s) URL",
                self.public_base_url
            )));
        }
        Ok(())
    }

    /// 中继回调的完整地址
    pub fn hop_endpoint(&self) -> String {
        format!(
            "{}{}",
            self.public_base_url.trim_end_matches('/'),
            self.hop_path
        )
    }
}

fn env_parse<T: FromStr>(var_name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::EnvVarParseFailed {
            var_name: var_name.to_string(),
            value,
            expected_type: std::any::type_name::<T>().to_string(),
        }),
        Err(_) => Ok(default),
    }
}

//! LLM API 客户端
//!
//! 封装外部评分能力的调用：输入模型 + 提示词，输出原始文本。
//! 错误在这里完成分类（限流 / 凭证 / 不可用 / 其他），不做任何重试。
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的服务（如 Anthropic 兼容端点、Azure、Gemini 等）

use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ScoringError;

/// 外部评分能力
#[async_trait]
pub trait ScoringBackend: Send + Sync {
    /// 调用一次模型，返回去掉首尾空白的响应文本
    async fn complete(
        &self,
        model: &str,
        system_message: &str,
        user_message: &str,
    ) -> Result<String, ScoringError>;
}

pub type DynScoringBackend = Arc<dyn ScoringBackend>;

/// 基于 async-openai 的实现
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    max_tokens: u32,
    temperature: f32,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl ScoringBackend for LlmClient {
    async fn complete(
        &self,
        model: &str,
        system_message: &str,
        user_message: &str,
    ) -> Result<String, ScoringError> {
        debug!("调用 LLM API，模型: {}", model);
        debug!("用户消息长度: {} 字符", user_message.len());

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_message)
            .build()
            .map_err(classify_openai_error)?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(classify_openai_error)?;

        let messages = vec![
            ChatCompletionRequestMessage::System(system_msg),
            ChatCompletionRequestMessage::User(user_msg),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(classify_openai_error)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            classify_openai_error(e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ScoringError::BadUpstreamFormat {
                reason: "LLM returned no content".to_string(),
                excerpt: String::new(),
            })?;

        Ok(content.trim().to_string())
    }
}

/// 把 async-openai 的错误映射为评分错误分类
fn classify_openai_error(err: OpenAIError) -> ScoringError {
    match err {
        OpenAIError::Reqwest(e) => match e.status() {
            Some(status) => ScoringError::from_status(status.as_u16(), e.to_string(), None),
            None => ScoringError::UpstreamUnavailable {
                status: None,
                message: e.to_string(),
            },
        },
        OpenAIError::ApiError(api) => {
            classify_api_error(api.code.as_deref(), api.r#type.as_deref(), &api.message)
        }
        other => ScoringError::Upstream {
            status: None,
            message: other.to_string(),
        },
    }
}

/// 根据 API 错误体里的 code / type 分类
///
/// 兼容端点不一定回传 HTTP 状态码，只能依据错误体判断。
fn classify_api_error(code: Option<&str>, kind: Option<&str>, message: &str) -> ScoringError {
    let tag = format!(
        "{} {}",
        code.unwrap_or_default(),
        kind.unwrap_or_default()
    )
    .to_lowercase();

    let status = if tag.contains("rate_limit") {
        429
    } else if tag.contains("invalid_api_key")
        || tag.contains("authentication")
        || tag.contains("unauthorized")
    {
        401
    } else if tag.contains("server_error")
        || tag.contains("overloaded")
        || tag.contains("api_error")
    {
        503
    } else {
        return ScoringError::Upstream {
            status: None,
            message: message.to_string(),
        };
    };

    ScoringError::from_status(status, message, None)
}

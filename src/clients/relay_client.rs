//! 中继客户端
//!
//! 外部消息中继 / 延迟调度能力：`enqueue(endpoint, payload, delay)`，
//! 投递后不等待任何送达确认。任务状态只存在于负载里。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::RelayError;

/// 消息中继能力
#[async_trait]
pub trait Relay: Send + Sync {
    /// 把 `payload` 投递给 `endpoint`，可选延迟
    async fn enqueue(
        &self,
        endpoint: &str,
        payload: &Value,
        delay: Option<Duration>,
    ) -> Result<(), RelayError>;
}

pub type DynRelay = Arc<dyn Relay>;

/// QStash 风格的发布接口：`POST {base}/v2/publish/{destination}`
pub struct QStashRelay {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl QStashRelay {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.relay_base_url.trim_end_matches('/').to_string(),
            token: config.relay_token.clone(),
        }
    }

    fn publish_url(&self, endpoint: &str) -> String {
        format!("{}/v2/publish/{}", self.base_url, endpoint)
    }
}

/// 延迟请求头的取值，例如 `30s`
fn delay_header(delay: Duration) -> String {
    format!("{}s", delay.as_secs())
}

#[async_trait]
impl Relay for QStashRelay {
    async fn enqueue(
        &self,
        endpoint: &str,
        payload: &Value,
        delay: Option<Duration>,
    ) -> Result<(), RelayError> {
        let url = self.publish_url(endpoint);
        debug!("投递中继消息: {} (延迟: {:?})", endpoint, delay);

        let mut request = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(payload)?);

        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            request = request.header("Upstash-Delay", delay_header(delay));
        }

        let response = request
            .send()
            .await
            .map_err(|source| RelayError::RequestFailed {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RelayError::Rejected {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        debug!("中继消息已投递: {}", endpoint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_url_appends_destination() {
        let config = Config {
            relay_base_url: "https://qstash.example.com/".to_string(),
            ..Config::default()
        };
        let relay = QStashRelay::new(&config);
        assert_eq!(
            relay.publish_url("https://scores.example.com/api/batch-processor"),
            "https://qstash.example.com/v2/publish/https://scores.example.com/api/batch-processor"
        );
    }

    #[test]
    fn test_delay_header_in_seconds() {
        assert_eq!(delay_header(Duration::from_secs(30)), "30s");
    }
}

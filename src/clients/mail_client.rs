//! 邮件客户端
//!
//! 外部事务邮件能力：`send(from, to, subject, html, attachments)`，
//! 成功返回邮件 ID。附件内容是纯文本表格，发送前做 base64 编码。

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::Config;
use crate::error::NotifyError;

/// 邮件附件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    pub filename: String,
    /// 未编码的文本内容
    pub content: String,
}

/// 待发送的邮件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<EmailAttachment>,
}

/// 事务邮件能力
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<String, NotifyError>;
}

pub type DynMailer = Arc<dyn Mailer>;

/// Resend 风格的邮件接口：`POST {base}/emails`
pub struct ResendMailer {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SendErrorResponse {
    message: Option<String>,
}

impl ResendMailer {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.mail_api_base_url.trim_end_matches('/').to_string(),
            api_key: config.mail_api_key.clone(),
        }
    }
}

/// 构建请求体，附件内容做 base64 编码
fn request_body(email: &OutgoingEmail) -> Value {
    let attachments: Vec<Value> = email
        .attachments
        .iter()
        .map(|a| {
            json!({
                "filename": a.filename,
                "content": base64::engine::general_purpose::STANDARD.encode(a.content.as_bytes()),
            })
        })
        .collect();

    json!({
        "from": email.from,
        "to": [email.to],
        "subject": email.subject,
        "html": email.html,
        "attachments": attachments,
    })
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<String, NotifyError> {
        debug!(
            "发送邮件: {} -> {} (附件 {} 个)",
            email.subject,
            email.to,
            email.attachments.len()
        );

        let response = self
            .http
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body(email))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<SendErrorResponse>(&text)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or(text);
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let sent: SendResponse = response.json().await?;
        Ok(sent.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_encodes_attachments() {
        let email = OutgoingEmail {
            from: "Batch Analyzer <onboarding@resend.dev>".into(),
            to: "user@example.com".into(),
            subject: "Done".into(),
            html: "<p>hi</p>".into(),
            attachments: vec![EmailAttachment {
                filename: "results.csv".into(),
                content: "Ticker\nAAPL\n".into(),
            }],
        };

        let body = request_body(&email);
        assert_eq!(body["to"][0], "user@example.com");
        assert_eq!(body["attachments"][0]["filename"], "results.csv");
        assert_eq!(body["attachments"][0]["content"], "VGlja2VyCkFBUEwK");
    }

    #[test]
    fn test_request_body_without_attachments() {
        let email = OutgoingEmail {
            from: "a@b.co".into(),
            to: "c@d.co".into(),
            subject: "s".into(),
            html: String::new(),
            attachments: Vec::new(),
        };
        assert!(request_body(&email)["attachments"]
            .as_array()
            .unwrap()
            .is_empty());
    }
}

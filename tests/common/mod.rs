//! 测试用的外部能力替身
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use batch_scorer::clients::{Mailer, OutgoingEmail, Relay, ScoringBackend};
use batch_scorer::error::{NotifyError, RelayError, ScoringError};
use batch_scorer::{AppState, Config, Job};
use serde_json::{json, Value};

/// 按提示词里的标识符逐个打分；可为第 n 次调用指定原始响应
#[derive(Default)]
pub struct EchoBackend {
    calls: AtomicUsize,
    scripted: Mutex<HashMap<usize, Result<String, ScoringError>>>,
}

impl EchoBackend {
    /// 第 `call` 次调用（从 0 开始）返回指定内容
    pub fn script(&self, call: usize, response: Result<String, ScoringError>) {
        self.scripted.lock().unwrap().insert(call, response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringBackend for EchoBackend {
    async fn complete(&self, _: &str, _: &str, user: &str) -> Result<String, ScoringError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(response) = self.scripted.lock().unwrap().remove(&call) {
            return response;
        }

        let entries = user
            .lines()
            .find_map(|l| l.split_once("):** "))
            .map(|(_, rest)| rest)
            .unwrap_or_default();
        let results: Vec<Value> = entries
            .split(", ")
            .map(|t| {
                json!({
                    "ticker": t,
                    "company_name": format!("{} Holdings", t),
                    "resilience_score": 8,
                    "optionality_score": 6.5,
                    "notes": "Solid \"moat\", steady cash flow",
                })
            })
            .collect();

        Ok(format!(
            "Here is the analysis:\n```json\n{}\n```",
            json!({ "results": results })
        ))
    }
}

/// 记录所有投递，不真正延迟
#[derive(Default)]
pub struct RecordingRelay {
    pub sent: Mutex<Vec<(String, Value, Option<Duration>)>>,
    pub reject: AtomicBool,
}

impl RecordingRelay {
    /// 取出最早一条待投递的任务快照
    pub fn pop_front(&self) -> Option<Job> {
        let mut sent = self.sent.lock().unwrap();
        if sent.is_empty() {
            return None;
        }
        let (_, payload, _) = sent.remove(0);
        Some(serde_json::from_value(payload).expect("relay payload is a job snapshot"))
    }

    pub fn len(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Relay for RecordingRelay {
    async fn enqueue(
        &self,
        endpoint: &str,
        payload: &Value,
        delay: Option<Duration>,
    ) -> Result<(), RelayError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(RelayError::Rejected {
                endpoint: endpoint.to_string(),
                status: 503,
                message: "relay unavailable".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((endpoint.to_string(), payload.clone(), delay));
        Ok(())
    }
}

#[derive(Default)]
pub struct CapturingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

impl CapturingMailer {
    pub fn emails(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<String, NotifyError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(email.clone());
        Ok(format!("email_{}", sent.len()))
    }
}

pub struct TestEnv {
    pub state: Arc<AppState>,
    pub backend: Arc<EchoBackend>,
    pub relay: Arc<RecordingRelay>,
    pub mailer: Arc<CapturingMailer>,
}

pub fn test_env() -> TestEnv {
    test_env_with(Config::default())
}

pub fn test_env_with(config: Config) -> TestEnv {
    let backend = Arc::new(EchoBackend::default());
    let relay = Arc::new(RecordingRelay::default());
    let mailer = Arc::new(CapturingMailer::default());

    let state = Arc::new(AppState::new(
        config,
        backend.clone(),
        relay.clone(),
        mailer.clone(),
    ));

    TestEnv {
        state,
        backend,
        relay,
        mailer,
    }
}

pub fn tickers(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("TK{:02}", i)).collect()
}

/// CSV 附件的数据行数（不含表头）
pub fn csv_rows(content: &str) -> usize {
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    reader.records().count()
}

//! 评分服务 - 业务能力层
//!
//! 只负责"给一个分块打分"能力，不关心任务流程
//!
//! 处理步骤：
//! 1. 构建提示词并调用一次外部评分能力（瞬时错误可按策略重试）
//! 2. 从原始文本中提取 JSON（优先 ```json 代码块，其次裸对象）
//! 3. 校验结构：必须有 `results` 列表
//! 4. 完整性：记录数多于请求数，或覆盖的请求标识符不足 80%，视为失败
//! 5. 逐条校验：任意一条不合法则整块失败，不丢弃、不截断

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clients::DynScoringBackend;
use crate::config::Config;
use crate::error::ScoringError;
use crate::models::score::score_in_range;
use crate::models::{ScoreResult, ScoringMode};
use crate::services::prompt::build_scoring_prompt;
use crate::utils::truncate_text;

/// 诊断信息中原始响应的最大长度
const EXCERPT_LEN: usize = 500;
/// 缺失标识符最多列出的数量
const MAX_REPORTED_MISSING: usize = 10;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:json|JSON)?\s*([\s\S]*?)\s*```").expect("fenced block regex")
});
static BARE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\{[\s\S]*\})").expect("bare object regex"));

/// 瞬时错误的重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// 不重试
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_backoff: Duration::ZERO,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.scoring_max_retries,
            base_backoff: Duration::from_millis(config.scoring_retry_backoff_ms),
        }
    }

    /// 第 `attempt` 次重试前的等待时间（从 0 开始）
    ///
    /// 限流响应自带的 retry-after 优先于指数退避。
    pub fn backoff_for(&self, attempt: u32, err: &ScoringError) -> Duration {
        if let ScoringError::UpstreamRateLimited {
            retry_after: Some(secs),
            ..
        } = err
        {
            return Duration::from_secs(*secs);
        }
        self.base_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// 评分服务
///
/// 职责：
/// - 为单个分块调用外部评分能力
/// - 校验并规范化响应
/// - 只返回"整块成功"或"分类后的整块失败"
pub struct Scorer {
    backend: DynScoringBackend,
    retry: RetryPolicy,
}

impl Scorer {
    pub fn new(backend: DynScoringBackend, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    /// 给一个分块打分
    pub async fn score_chunk(
        &self,
        chunk: &[String],
        model: &str,
        mode: ScoringMode,
    ) -> Result<Vec<ScoreResult>, ScoringError> {
        let (system_message, user_message) = build_scoring_prompt(chunk, mode);

        let raw = self
            .complete_with_retry(model, &system_message, &user_message)
            .await?;
        debug!("LLM 原始响应: {}", truncate_text(&raw, 200));

        let results = parse_scoring_response(&raw, chunk, mode)?;
        debug!("分块评分完成: 请求 {} 个，返回 {} 条", chunk.len(), results.len());

        Ok(results)
    }

    async fn complete_with_retry(
        &self,
        model: &str,
        system_message: &str,
        user_message: &str,
    ) -> Result<String, ScoringError> {
        let mut attempt = 0;
        loop {
            match self
                .backend
                .complete(model, system_message, user_message)
                .await
            {
                Ok(text) => {
                    if attempt > 0 {
                        info!("✓ 第 {} 次重试成功", attempt);
                    }
                    return Ok(text);
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let wait = self.retry.backoff_for(attempt, &e);
                    attempt += 1;
                    warn!(
                        "⚠️ 评分调用失败 ({}), {:?} 后进行第 {}/{} 次重试",
                        e, wait, attempt, self.retry.max_retries
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// 从原始文本中提取 JSON 负载
///
/// 代码块和裸对象都匹配时优先代码块；都不匹配时原样返回。
pub fn extract_payload(raw: &str) -> &str {
    FENCED_BLOCK
        .captures(raw)
        .or_else(|| BARE_OBJECT.captures(raw))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
}

/// 解析并校验评分响应
pub fn parse_scoring_response(
    raw: &str,
    requested: &[String],
    mode: ScoringMode,
) -> Result<Vec<ScoreResult>, ScoringError> {
    let excerpt = || truncate_text(raw, EXCERPT_LEN);

    let payload: Value =
        serde_json::from_str(extract_payload(raw)).map_err(|e| ScoringError::BadUpstreamFormat {
            reason: format!("invalid JSON: {}", e),
            excerpt: excerpt(),
        })?;

    let records = payload
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| ScoringError::BadUpstreamFormat {
            reason: "response has no \"results\" list".to_string(),
            excerpt: excerpt(),
        })?;

    if records.len() > requested.len() {
        return Err(ScoringError::BadUpstreamFormat {
            reason: format!(
                "returned {} records for {} requested identifiers",
                records.len(),
                requested.len()
            ),
            excerpt: excerpt(),
        });
    }

    // 覆盖的请求标识符 < 80%（重复记录只算一次）
    let missing = missing_identifiers(requested, records);
    let covered = match mode {
        ScoringMode::TickerOnly => requested.len() - missing.len(),
        ScoringMode::AnyEntity => distinct_records(records).min(requested.len()),
    };
    if covered * 5 < requested.len() * 4 {
        return Err(ScoringError::IncompleteResults {
            requested: requested.len(),
            returned: covered,
            missing: missing.into_iter().take(MAX_REPORTED_MISSING).collect(),
        });
    }

    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            validate_record(record).map_err(|reason| ScoringError::InvalidScoreData {
                index,
                reason,
                excerpt: truncate_text(&record.to_string(), EXCERPT_LEN),
            })
        })
        .collect()
}

/// 校验单条记录
fn validate_record(record: &Value) -> Result<ScoreResult, String> {
    let text_field = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| record.get(*name).and_then(Value::as_str))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let score_field = |name: &str| -> Result<f64, String> {
        let score = record
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| format!("{} is missing or not a number", name))?;
        if score_in_range(score) {
            Ok(score)
        } else {
            Err(format!("{} {} is outside [1, 10]", name, score))
        }
    };

    let identifier =
        text_field(&["ticker", "identifier"]).ok_or_else(|| "identifier is empty".to_string())?;
    let resolved_name = text_field(&["company_name", "resolved_name"])
        .ok_or_else(|| format!("company name for {} is empty", identifier))?;

    Ok(ScoreResult {
        resilience_score: score_field("resilience_score")?,
        optionality_score: score_field("optionality_score")?,
        notes: record
            .get("notes")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string(),
        identifier,
        resolved_name,
    })
}

/// 找出未出现在返回结果里的请求标识符（按代码或公司名，大小写不敏感）
fn missing_identifiers(requested: &[String], records: &[Value]) -> Vec<String> {
    let returned: HashSet<String> = records
        .iter()
        .flat_map(|r| {
            ["ticker", "identifier", "company_name", "resolved_name"]
                .into_iter()
                .filter_map(move |name| r.get(name).and_then(Value::as_str))
        })
        .map(|s| s.trim().to_lowercase())
        .collect();

    requested
        .iter()
        .filter(|id| !returned.contains(&id.trim().to_lowercase()))
        .cloned()
        .collect()
}

/// 不同记录的数量：按代码去重，没有代码时按公司名
///
/// 实体模式下模型会把名称解析成代码，无法逐个对应请求，只能按去重后的条数计算。
fn distinct_records(records: &[Value]) -> usize {
    records
        .iter()
        .filter_map(|r| {
            ["ticker", "identifier", "company_name", "resolved_name"]
                .into_iter()
                .find_map(|name| r.get(name).and_then(Value::as_str))
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
        })
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ScoringBackend;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// 按脚本依次返回响应的评分后端
    struct ScriptedBackend {
        responses: Mutex<VecDeque<Result<String, ScoringError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<Result<String, ScoringError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ScoringBackend for ScriptedBackend {
        async fn complete(&self, _: &str, _: &str, _: &str) -> Result<String, ScoringError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn record(ticker: &str, a: f64, b: f64) -> Value {
        serde_json::json!({
            "ticker": ticker,
            "company_name": format!("{} Inc.", ticker),
            "resilience_score": a,
            "optionality_score": b,
            "notes": "ok",
        })
    }

    fn response(records: Vec<Value>) -> String {
        serde_json::json!({ "results": records }).to_string()
    }

    fn parse(raw: &str, requested: &[String]) -> Result<Vec<ScoreResult>, ScoringError> {
        parse_scoring_response(raw, requested, ScoringMode::TickerOnly)
    }

    #[test]
    fn test_extract_prefers_fenced_block() {
        let raw = "Here {\"results\": \"bare\"}\n```json\n{\"results\": []}\n```";
        assert_eq!(extract_payload(raw), "{\"results\": []}");
    }

    #[test]
    fn test_extract_bare_object() {
        let raw = "Sure! {\"results\": []} Hope that helps.";
        assert_eq!(extract_payload(raw), "{\"results\": []}");
    }

    #[test]
    fn test_parse_valid_response() {
        let raw = format!(
            "```json\n{}\n```",
            response(vec![record("AAPL", 8.5, 7.0), record("MSFT", 9.0, 8.0)])
        );
        let results = parse(&raw, &ids(&["AAPL", "MSFT"])).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].identifier, "AAPL");
        assert_eq!(results[0].resolved_name, "AAPL Inc.");
        assert_eq!(results[1].optionality_score, 8.0);
    }

    #[test]
    fn test_malformed_text_is_bad_format() {
        let err = parse("I cannot help with that.", &ids(&["AAPL"])).unwrap_err();
        assert!(matches!(err, ScoringError::BadUpstreamFormat { .. }));
        assert_eq!(err.excerpt(), Some("I cannot help with that."));
    }

    #[test]
    fn test_missing_results_list_is_bad_format() {
        let err = parse("{\"results\": {\"AAPL\": 5}}", &ids(&["AAPL"])).unwrap_err();
        assert!(matches!(err, ScoringError::BadUpstreamFormat { .. }));
    }

    #[test]
    fn test_out_of_range_scores_fail_whole_chunk() {
        for (a, b) in [(0.0, 5.0), (5.0, 11.0)] {
            let raw = response(vec![record("AAPL", 8.0, 8.0), record("MSFT", a, b)]);
            let err = parse(&raw, &ids(&["AAPL", "MSFT"])).unwrap_err();
            assert!(
                matches!(err, ScoringError::InvalidScoreData { index: 1, .. }),
                "unexpected: {:?}",
                err
            );
        }
    }

    #[test]
    fn test_non_numeric_score_is_invalid() {
        let mut bad = record("AAPL", 5.0, 5.0);
        bad["resilience_score"] = Value::String("high".into());
        let err = parse(&response(vec![bad]), &ids(&["AAPL"])).unwrap_err();
        assert!(matches!(err, ScoringError::InvalidScoreData { index: 0, .. }));
    }

    #[test]
    fn test_empty_company_name_is_invalid() {
        let mut bad = record("AAPL", 5.0, 5.0);
        bad["company_name"] = Value::String("  ".into());
        let err = parse(&response(vec![bad]), &ids(&["AAPL"])).unwrap_err();
        assert!(matches!(err, ScoringError::InvalidScoreData { .. }));
    }

    #[test]
    fn test_incomplete_results_list_missing_ids() {
        let requested = ids(&["A", "B", "C", "D", "E"]);
        let raw = response(vec![record("A", 5.0, 5.0), record("C", 5.0, 5.0), record("E", 5.0, 5.0)]);
        let err = parse(&raw, &requested).unwrap_err();

        match err {
            ScoringError::IncompleteResults {
                requested,
                returned,
                missing,
            } => {
                assert_eq!(requested, 5);
                assert_eq!(returned, 3);
                assert_eq!(missing, ids(&["B", "D"]));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_exactly_eighty_percent_is_accepted() {
        let requested = ids(&["A", "B", "C", "D", "E"]);
        let raw = response(
            ["A", "B", "C", "D"]
                .iter()
                .map(|t| record(t, 5.0, 5.0))
                .collect(),
        );
        assert_eq!(parse(&raw, &requested).unwrap().len(), 4);
    }

    #[test]
    fn test_missing_list_is_capped() {
        let requested: Vec<String> = (0..20).map(|i| format!("T{}", i)).collect();
        let err = parse(&response(vec![]), &requested).unwrap_err();
        match err {
            ScoringError::IncompleteResults { missing, .. } => assert_eq!(missing.len(), 10),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_records_do_not_count_as_coverage() {
        let requested = ids(&["A", "B", "C", "D", "E"]);
        let raw = response((0..5).map(|_| record("A", 5.0, 5.0)).collect());
        let err = parse(&raw, &requested).unwrap_err();

        match err {
            ScoringError::IncompleteResults {
                returned, missing, ..
            } => {
                assert_eq!(returned, 1);
                assert_eq!(missing, ids(&["B", "C", "D", "E"]));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_more_records_than_requested_is_bad_format() {
        let raw = response(vec![record("A", 5.0, 5.0), record("B", 5.0, 5.0)]);
        let err = parse(&raw, &ids(&["A"])).unwrap_err();
        assert!(matches!(err, ScoringError::BadUpstreamFormat { .. }));
    }

    #[test]
    fn test_any_entity_counts_distinct_resolved_records() {
        let requested = ids(&["Apple", "Microsoft"]);
        let resolved = response(vec![record("AAPL", 8.0, 7.0), record("MSFT", 9.0, 8.0)]);
        let results =
            parse_scoring_response(&resolved, &requested, ScoringMode::AnyEntity).unwrap();
        assert_eq!(results.len(), 2);

        let repeated = response(vec![record("AAPL", 8.0, 7.0), record("aapl", 8.0, 7.0)]);
        let err =
            parse_scoring_response(&repeated, &requested, ScoringMode::AnyEntity).unwrap_err();
        assert!(matches!(err, ScoringError::IncompleteResults { returned: 1, .. }));
    }

    #[test]
    fn test_backoff_prefers_retry_after() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
        };
        let limited = ScoringError::from_status(429, "busy", Some(7));
        let down = ScoringError::from_status(503, "down", None);

        assert_eq!(policy.backoff_for(0, &limited), Duration::from_secs(7));
        assert_eq!(policy.backoff_for(0, &down), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2, &down), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_when_enabled() {
        let backend = ScriptedBackend::new(vec![
            Err(ScoringError::from_status(503, "down", None)),
            Ok(response(vec![record("AAPL", 6.0, 6.0)])),
        ]);
        let scorer = Scorer::new(
            backend.clone(),
            RetryPolicy {
                max_retries: 2,
                base_backoff: Duration::from_millis(1),
            },
        );

        let results = scorer
            .score_chunk(&ids(&["AAPL"]), "model", ScoringMode::TickerOnly)
            .await;
        let results = tokio_test::assert_ok!(results);
        assert_eq!(results.len(), 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let backend = ScriptedBackend::new(vec![
            Err(ScoringError::from_status(429, "busy", None)),
            Ok(response(vec![record("AAPL", 6.0, 6.0)])),
        ]);
        let scorer = Scorer::new(backend.clone(), RetryPolicy::none());

        let err = scorer
            .score_chunk(&ids(&["AAPL"]), "model", ScoringMode::TickerOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, ScoringError::UpstreamRateLimited { .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_format_errors_are_never_retried() {
        let backend = ScriptedBackend::new(vec![
            Ok("not json".to_string()),
            Ok(response(vec![record("AAPL", 6.0, 6.0)])),
        ]);
        let scorer = Scorer::new(
            backend.clone(),
            RetryPolicy {
                max_retries: 3,
                base_backoff: Duration::from_millis(1),
            },
        );

        let err = scorer
            .score_chunk(&ids(&["AAPL"]), "model", ScoringMode::TickerOnly)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "bad_upstream_format");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }
}

use serde::{Deserialize, Serialize};

/// 分数下限
pub const MIN_SCORE: f64 = 1.0;
/// 分数上限
pub const MAX_SCORE: f64 = 10.0;

/// 单个公司的评分结果
///
/// 序列化字段名保持与历史接口一致（`ticker` / `company_name` / ...）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    #[serde(rename = "ticker", alias = "identifier")]
    pub identifier: String,

    #[serde(rename = "company_name", alias = "resolved_name")]
    pub resolved_name: String,

    /// 韧性分（score_a）
    pub resilience_score: f64,

    /// 可选性分（score_b）
    pub optionality_score: f64,

    #[serde(default)]
    pub notes: String,
}

impl ScoreResult {
    /// 两个分数是否都在 [1, 10] 内
    pub fn scores_in_range(&self) -> bool {
        score_in_range(self.resilience_score) && score_in_range(self.optionality_score)
    }
}

pub fn score_in_range(score: f64) -> bool {
    score.is_finite() && (MIN_SCORE..=MAX_SCORE).contains(&score)
}

/// 标识符解析模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// 只接受股票代码，严格匹配
    #[default]
    TickerOnly,
    /// 公司名或代码均可，由模型解析
    AnyEntity,
}

impl ScoringMode {
    /// 是否需要把标识符统一转为大写
    pub fn uppercases_input(&self) -> bool {
        matches!(self, ScoringMode::TickerOnly)
    }
}

impl std::fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoringMode::TickerOnly => write!(f, "ticker_only"),
            ScoringMode::AnyEntity => write!(f, "any_entity"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_historical_format() {
        let result = ScoreResult {
            identifier: "AAPL".into(),
            resolved_name: "Apple Inc.".into(),
            resilience_score: 8.5,
            optionality_score: 7.0,
            notes: "Strong ecosystem".into(),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["ticker"], "AAPL");
        assert_eq!(value["company_name"], "Apple Inc.");
        assert_eq!(value["resilience_score"], 8.5);
    }

    #[test]
    fn test_score_range_is_inclusive() {
        assert!(score_in_range(1.0));
        assert!(score_in_range(10.0));
        assert!(!score_in_range(0.0));
        assert!(!score_in_range(11.0));
        assert!(!score_in_range(f64::NAN));
    }

    #[test]
    fn test_mode_defaults_to_ticker_only() {
        let mode: ScoringMode = serde_json::from_str("\"any_entity\"").unwrap();
        assert_eq!(mode, ScoringMode::AnyEntity);
        assert_eq!(ScoringMode::default(), ScoringMode::TickerOnly);
    }
}

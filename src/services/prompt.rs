//! 评分提示词
//!
//! 纯函数：(分块, 模式) → (system, user)。除了文本指令外没有任何行为依赖它。

use crate::models::ScoringMode;

/// 系统消息
pub const SYSTEM_MESSAGE: &str =
    "You are a financial analyst using the Complexity Investing framework. \
     You answer with strictly formatted JSON and nothing else.";

/// 构建评分提示词，返回 (system_message, user_message)
pub fn build_scoring_prompt(chunk: &[String], mode: ScoringMode) -> (String, String) {
    let count = chunk.len();

    let subject = match mode {
        ScoringMode::TickerOnly => format!(
            "For each of the {count} company ticker symbols provided, evaluate and return ONLY two scores. \
             Treat every entry strictly as a ticker symbol and echo it unchanged in the \"ticker\" field."
        ),
        ScoringMode::AnyEntity => format!(
            "For each of the {count} companies provided (ticker symbols or company names), resolve the company, \
             then evaluate and return ONLY two scores. Put the resolved ticker (or the entry as given when no \
             ticker exists) in the \"ticker\" field and the full company name in \"company_name\"."
        ),
    };

    let user_message = format!(
        r#"{subject}

1. **Resilience Score (1-10)**: Overall ability to adapt and thrive in changing conditions
   - Consider: adaptability, financial strength, competitive moats, diversification
   - 10 = Extremely resilient (Amazon, Microsoft level)
   - 1 = Highly fragile

2. **Optionality Score (1-10)**: Potential for growth through adjacent markets and new opportunities
   - Consider: platform extensibility, adjacent market opportunities, innovation pipeline, strategic options
   - 10 = Exceptional optionality (many high-value expansion paths)
   - 1 = Very limited growth options

**CRITICAL: Respond ONLY in this exact JSON format, with exactly {count} entries in "results", one per input, in input order:**

```json
{{
  "results": [
    {{
      "ticker": "AAPL",
      "company_name": "Apple Inc.",
      "resilience_score": 8.5,
      "optionality_score": 7.0,
      "notes": "Brief 1-2 sentence rationale"
    }}
  ]
}}
```

Both scores must be numbers between 1 and 10 inclusive.

**Response mode:** {mode}
**Entries to analyze ({count}):** {entries}

Return the JSON only - no other text."#,
        entries = chunk.join(", "),
    );

    (SYSTEM_MESSAGE.to_string(), user_message)
}

//! 通知服务 - 业务能力层
//!
//! 只负责"发出终态邮件"能力：成功报告（统计 + 完整结果表）
//! 或失败报告（诊断 + 可选的部分结果表）。不重试，不升级到其他渠道。

use tracing::{debug, info};

use crate::clients::{DynMailer, EmailAttachment, OutgoingEmail};
use crate::error::NotifyError;
use crate::models::ScoreResult;

/// 结果表表头
const CSV_HEADER: [&str; 5] = [
    "Ticker",
    "Company Name",
    "Resilience Score",
    "Optionality Score",
    "Notes",
];

/// "高分"阈值
const HIGH_SCORE: f64 = 7.0;

/// 结果汇总统计
#[derive(Debug, Clone, PartialEq)]
pub struct ResultStats {
    pub count: usize,
    pub avg_resilience: f64,
    pub avg_optionality: f64,
    pub high_resilience: usize,
    pub high_optionality: usize,
}

impl ResultStats {
    pub fn from_results(results: &[ScoreResult]) -> Self {
        let count = results.len();
        let mean = |score: fn(&ScoreResult) -> f64| {
            if count == 0 {
                0.0
            } else {
                results.iter().map(score).sum::<f64>() / count as f64
            }
        };

        Self {
            count,
            avg_resilience: mean(|r| r.resilience_score),
            avg_optionality: mean(|r| r.optionality_score),
            high_resilience: results
                .iter()
                .filter(|r| r.resilience_score >= HIGH_SCORE)
                .count(),
            high_optionality: results
                .iter()
                .filter(|r| r.optionality_score >= HIGH_SCORE)
                .count(),
        }
    }
}

/// 失败报告的输入
#[derive(Debug, Clone)]
pub struct FailureReport<'a> {
    pub destination: &'a str,
    pub job_id: &'a str,
    pub error_message: String,
    pub remediation: &'a str,
    pub partial_results: &'a [ScoreResult],
    /// 失败分块下标（从 0 开始）
    pub failed_chunk: usize,
    pub total_chunks: usize,
}

/// 通知服务
pub struct Notifier {
    mailer: DynMailer,
    from: String,
    /// 成功邮件末尾"再来一次"链接指向的地址
    app_url: Option<String>,
}

impl Notifier {
    pub fn new(mailer: DynMailer, from: impl Into<String>) -> Self {
        Self {
            mailer,
            from: from.into(),
            app_url: None,
        }
    }

    /// 设置应用地址，成功邮件会附上返回链接
    pub fn with_app_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        let url = url.trim_end_matches('/');
        self.app_url = (!url.is_empty()).then(|| url.to_string());
        self
    }

    /// 发送成功报告，返回邮件 ID
    pub async fn send_success(
        &self,
        destination: &str,
        results: &[ScoreResult],
        job_id: &str,
    ) -> Result<String, NotifyError> {
        let email = self.success_email(destination, results, job_id)?;
        let id = self.mailer.send(&email).await?;
        info!("[任务 {}] 📧 结果邮件已发送: {}", job_id, id);
        Ok(id)
    }

    /// 发送失败报告，返回邮件 ID
    pub async fn send_failure(&self, report: &FailureReport<'_>) -> Result<String, NotifyError> {
        let email = self.failure_email(report)?;
        let id = self.mailer.send(&email).await?;
        info!("[任务 {}] 📧 失败通知已发送: {}", report.job_id, id);
        Ok(id)
    }

    /// 构建成功邮件
    pub fn success_email(
        &self,
        destination: &str,
        results: &[ScoreResult],
        job_id: &str,
    ) -> Result<OutgoingEmail, NotifyError> {
        let stats = ResultStats::from_results(results);
        debug!("[任务 {}] 汇总统计: {:?}", job_id, stats);

        Ok(OutgoingEmail {
            from: self.from.clone(),
            to: destination.to_string(),
            subject: format!("Analysis Complete: {} Companies Evaluated", stats.count),
            html: render_success_html(&stats, job_id, self.app_url.as_deref()),
            attachments: vec![EmailAttachment {
                filename: attachment_name("resilience_analysis"),
                content: render_csv(results)?,
            }],
        })
    }

    /// 构建失败邮件（只有存在部分结果时才带附件）
    pub fn failure_email(&self, report: &FailureReport<'_>) -> Result<OutgoingEmail, NotifyError> {
        let attachments = if report.partial_results.is_empty() {
            Vec::new()
        } else {
            vec![EmailAttachment {
                filename: attachment_name("partial_results"),
                content: render_csv(report.partial_results)?,
            }]
        };

        Ok(OutgoingEmail {
            from: self.from.clone(),
            to: report.destination.to_string(),
            subject: format!("Batch Analysis Error - Job {}", report.job_id),
            html: render_failure_html(report),
            attachments,
        })
    }
}

/// 渲染结果表（CSV，内嵌引号按规则加倍）
pub fn render_csv(results: &[ScoreResult]) -> Result<String, NotifyError> {
    let render_err = |e: csv::Error| NotifyError::Render(e.to_string());

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER).map_err(render_err)?;
    for r in results {
        writer
            .write_record([
                r.identifier.as_str(),
                r.resolved_name.as_str(),
                r.resilience_score.to_string().as_str(),
                r.optionality_score.to_string().as_str(),
                r.notes.as_str(),
            ])
            .map_err(render_err)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| NotifyError::Render(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| NotifyError::Render(e.to_string()))
}

fn attachment_name(prefix: &str) -> String {
    format!("{}_{}.csv", prefix, chrono::Utc::now().format("%Y-%m-%d"))
}

fn render_success_html(stats: &ResultStats, job_id: &str, app_url: Option<&str>) -> String {
    let row = |label: &str, value: String| {
        format!(
            r#"<tr><td style="padding: 8px; border: 1px solid #ddd;"><strong>{}</strong></td><td style="padding: 8px; border: 1px solid #ddd;">{}</td></tr>"#,
            label, value
        )
    };

    format!(
        r#"<h2>Your Batch Analysis is Complete! 🎉</h2>
<p>Successfully analyzed <strong>{count} companies</strong> using the Complexity Investing framework.</p>
<h3>Summary Statistics:</h3>
<table style="border-collapse: collapse; margin: 20px 0;">
{avg_r}
{avg_o}
{high_r}
{high_o}
</table>
<p>The complete results are attached as a CSV file that you can open in Excel or Google Sheets.</p>
{again}<hr style="margin: 30px 0; border: none; border-top: 1px solid #ddd;">
<p style="color: #666; font-size: 12px;">Job ID: {job_id}<br>Powered by Complexity Investing Framework</p>"#,
        count = stats.count,
        avg_r = row(
            "Average Resilience Score:",
            format!("{:.1}/10", stats.avg_resilience)
        ),
        avg_o = row(
            "Average Optionality Score:",
            format!("{:.1}/10", stats.avg_optionality)
        ),
        high_r = row(
            "High Resilience (≥7):",
            format!("{} companies", stats.high_resilience)
        ),
        high_o = row(
            "High Optionality (≥7):",
            format!("{} companies", stats.high_optionality)
        ),
        job_id = html_escape(job_id),
        again = app_url
            .map(|url| {
                format!(
                    "<p><a href=\"{}\" style=\"color: #2563eb;\">Run another analysis</a></p>\n",
                    html_escape(url)
                )
            })
            .unwrap_or_default(),
    )
}

fn render_failure_html(report: &FailureReport<'_>) -> String {
    let attached = if report.partial_results.is_empty() {
        ""
    } else {
        "<p>We've attached the partial results that were successfully processed before the error occurred.</p>"
    };

    format!(
        r#"<h2>Batch Analysis Partially Failed</h2>
<p>Your batch job encountered an error while processing.</p>
<h3>Details:</h3>
<ul>
<li><strong>Job ID:</strong> {job_id}</li>
<li><strong>Failed at chunk:</strong> {failed} of {total}</li>
<li><strong>Error:</strong> {error}</li>
<li><strong>Successfully processed:</strong> {processed} companies</li>
</ul>
{attached}
<p>{remediation} Contact support if the issue persists.</p>"#,
        job_id = html_escape(report.job_id),
        failed = report.failed_chunk + 1,
        total = report.total_chunks,
        error = html_escape(&report.error_message),
        processed = report.partial_results.len(),
        attached = attached,
        remediation = html_escape(report.remediation),
    )
}

fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::Mailer;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct CapturingMailer {
        sent: Mutex<Vec<OutgoingEmail>>,
    }

    #[async_trait]
    impl Mailer for CapturingMailer {
        async fn send(&self, email: &OutgoingEmail) -> Result<String, NotifyError> {
            self.sent.lock().unwrap().push(email.clone());
            Ok("msg_1".to_string())
        }
    }

    fn result(ticker: &str, a: f64, b: f64, notes: &str) -> ScoreResult {
        ScoreResult {
            identifier: ticker.into(),
            resolved_name: format!("{} Inc.", ticker),
            resilience_score: a,
            optionality_score: b,
            notes: notes.into(),
        }
    }

    #[test]
    fn test_stats() {
        let results = vec![
            result("A", 8.0, 6.0, ""),
            result("B", 7.0, 9.0, ""),
            result("C", 3.0, 3.0, ""),
        ];
        let stats = ResultStats::from_results(&results);

        assert_eq!(stats.count, 3);
        assert!((stats.avg_resilience - 6.0).abs() < 1e-9);
        assert!((stats.avg_optionality - 6.0).abs() < 1e-9);
        assert_eq!(stats.high_resilience, 2);
        assert_eq!(stats.high_optionality, 1);
    }

    #[test]
    fn test_stats_of_empty_results() {
        let stats = ResultStats::from_results(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.avg_resilience, 0.0);
    }

    #[test]
    fn test_csv_doubles_embedded_quotes() {
        let csv = render_csv(&[result("AAPL", 8.5, 7.0, r#"Says "think different""#)]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(
            lines[0],
            "Ticker,Company Name,Resilience Score,Optionality Score,Notes"
        );
        assert_eq!(
            lines[1],
            r#"AAPL,AAPL Inc.,8.5,7,"Says ""think different""""#
        );
    }

    #[tokio::test]
    async fn test_success_email_has_one_row_per_result() {
        let mailer = Arc::new(CapturingMailer::default());
        let notifier = Notifier::new(mailer.clone(), "Batch Analyzer <a@b.co>");
        let results: Vec<_> = (0..40)
            .map(|i| result(&format!("T{}", i), 7.0, 5.0, "n"))
            .collect();

        let id = notifier
            .send_success("user@example.com", &results, "job_1")
            .await
            .unwrap();
        assert_eq!(id, "msg_1");

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Analysis Complete: 40 Companies Evaluated");
        assert!(sent[0].html.contains("7.0/10"));
        assert!(sent[0].html.contains("40 companies"));
        assert_eq!(sent[0].attachments.len(), 1);
        assert!(sent[0].attachments[0].filename.starts_with("resilience_analysis_"));
        assert_eq!(sent[0].attachments[0].content.lines().count(), 41);
    }

    #[test]
    fn test_success_email_links_back_to_app_when_configured() {
        let plain = Notifier::new(Arc::new(CapturingMailer::default()), "a@b.co");
        let email = plain
            .success_email("user@example.com", &[result("A", 5.0, 5.0, "")], "job_1")
            .unwrap();
        assert!(!email.html.contains("Run another analysis"));

        let linked = Notifier::new(Arc::new(CapturingMailer::default()), "a@b.co")
            .with_app_url("https://scores.example.com/");
        let email = linked
            .success_email("user@example.com", &[result("A", 5.0, 5.0, "")], "job_1")
            .unwrap();
        assert!(email
            .html
            .contains(r#"<a href="https://scores.example.com" style="color: #2563eb;">Run another analysis</a>"#));
    }

    #[test]
    fn test_failure_email_without_partial_results_has_no_attachment() {
        let notifier = Notifier::new(Arc::new(CapturingMailer::default()), "a@b.co");
        let report = FailureReport {
            destination: "user@example.com",
            job_id: "job_2",
            error_message: "Failed to parse AI response: <oops>".into(),
            remediation: "Please try again.",
            partial_results: &[],
            failed_chunk: 0,
            total_chunks: 3,
        };

        let email = notifier.failure_email(&report).unwrap();
        assert!(email.attachments.is_empty());
        assert!(email.html.contains("1 of 3"));
        assert!(email.html.contains("&lt;oops&gt;"));
        assert_eq!(email.subject, "Batch Analysis Error - Job job_2");
    }

    #[test]
    fn test_failure_email_attaches_partial_results() {
        let notifier = Notifier::new(Arc::new(CapturingMailer::default()), "a@b.co");
        let partial = vec![result("AAPL", 8.0, 8.0, "")];
        let report = FailureReport {
            destination: "user@example.com",
            job_id: "job_3",
            error_message: "boom".into(),
            remediation: "Please try again.",
            partial_results: &partial,
            failed_chunk: 1,
            total_chunks: 3,
        };

        let email = notifier.failure_email(&report).unwrap();
        assert_eq!(email.attachments.len(), 1);
        assert!(email.attachments[0].filename.starts_with("partial_results_"));
        assert!(email.html.contains("2 of 3"));
        assert!(email.html.contains("1 companies"));
    }
}

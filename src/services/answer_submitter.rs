//! 答案提交 - 业务能力层
//!
//! 把计算出的答案 POST 到提交地址，并解析响应：
//! 正确确认 / 答错反馈 / 下一个测验的地址。
//!
//! 网络或 HTTP 失败在本层有限次重试（带退避）；
//! "答错"不在本层处理，由编排层带着反馈回到推理步骤。

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value as JsonValue};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{SolverError, SolverResult};
use crate::models::{Answer, SubmissionOutcome};
use crate::utils::truncate_text;

/// 单次提交请求的时限
const SUBMIT_TIMEOUT_SECS: u64 = 30;

/// 答案提交器
pub struct AnswerSubmitter {
    client: Client,
    email: String,
    secret: String,
    max_retries: usize,
    retry_backoff: Duration,
}

impl AnswerSubmitter {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            email: config.submitter_email.clone(),
            secret: config.shared_secret.clone(),
            max_retries: config.submit_max_retries.max(1),
            retry_backoff: Duration::from_millis(1000),
        }
    }

    /// 提交答案并解析响应
    ///
    /// # 参数
    /// - `answer`: 待提交的答案（含提交地址）
    /// - `quiz_url`: 当前测验页面的地址（提交载荷要求回传）
    /// - `answer_key`: 答案字段的键名（通常为 "answer"）
    pub async fn submit(
        &self,
        answer: &Answer,
        quiz_url: &str,
        answer_key: &str,
    ) -> SolverResult<SubmissionOutcome> {
        let mut payload = json!({
            "email": self.email,
            "secret": self.secret,
            "url": quiz_url,
        });
        payload[answer_key] = answer.value.clone();

        info!(
            "📤 提交答案到 {}: {}",
            answer.submit_url,
            truncate_text(&answer.value.to_string(), 120)
        );

        let mut last_error = String::new();
        for attempt in 0..self.max_retries {
            match self.post_once(&answer.submit_url, &payload).await {
                Ok(body) => {
                    let outcome = parse_outcome(&body);
                    debug!("提交响应: {}", body);
                    return Ok(outcome);
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        "⚠️ 答案提交失败: {} (尝试 {}/{})",
                        last_error,
                        attempt + 1,
                        self.max_retries
                    );
                }
            }
            if attempt + 1 < self.max_retries {
                sleep(self.retry_backoff * (attempt as u32 + 1)).await;
            }
        }

        Err(SolverError::SubmissionError(format!(
            "已重试 {} 次: {}",
            self.max_retries, last_error
        )))
    }

    async fn post_once(&self, submit_url: &str, payload: &JsonValue) -> anyhow::Result<JsonValue> {
        let response = self
            .client
            .post(submit_url)
            .json(payload)
            .timeout(Duration::from_secs(SUBMIT_TIMEOUT_SECS))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP 状态码 {}", status);
        }

        let body = response.json::<JsonValue>().await?;
        Ok(body)
    }
}

/// 解析提交响应
///
/// 约定字段：`correct`（是否正确）、`url`（下一个测验）、`reason`（答错反馈）。
fn parse_outcome(body: &JsonValue) -> SubmissionOutcome {
    SubmissionOutcome {
        correct: body.get("correct").and_then(|v| v.as_bool()).unwrap_or(false),
        next_url: body
            .get("url")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.to_string()),
        reason: body
            .get("reason")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_outcome_correct_with_next_url() {
        let body = json!({"correct": true, "url": "https://quiz.example.com/next"});
        let outcome = parse_outcome(&body);
        assert!(outcome.correct);
        assert_eq!(
            outcome.next_url.as_deref(),
            Some("https://quiz.example.com/next")
        );
        assert!(outcome.reason.is_none());
    }

    #[test]
    fn test_parse_outcome_wrong_with_reason() {
        let body = json!({"correct": false, "reason": "expected a number"});
        let outcome = parse_outcome(&body);
        assert!(!outcome.correct);
        assert!(outcome.next_url.is_none());
        assert_eq!(outcome.reason.as_deref(), Some("expected a number"));
    }

    #[test]
    fn test_parse_outcome_empty_url_is_none() {
        let body = json!({"correct": true, "url": ""});
        let outcome = parse_outcome(&body);
        assert!(outcome.next_url.is_none());
    }

    #[test]
    fn test_parse_outcome_missing_fields_default() {
        let outcome = parse_outcome(&json!({}));
        assert!(!outcome.correct);
        assert!(outcome.next_url.is_none());
    }
}

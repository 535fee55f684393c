//! 测验链执行器 - 编排层
//!
//! 以显式状态机驱动一条测验链：
//!
//! ```text
//! Fetching → Extracting → Retrieving → Processing → Reasoning → Submitting
//!     ↑                                     ↑                        ↓
//!     └───────── Chaining（下一题）          └──── Chaining（答错重试）┘
//!                                                → Done / Failed
//! ```
//!
//! 时限规则：
//! - 全局时间预算覆盖整条链（不是单个测验），每次状态转换前检查
//! - 额外用 `timeout_at` 包住整次运行，正在进行的 I/O 在到点时被协作取消
//! - `DeadlineExceeded` 永远压过正在进行的重试

use std::sync::Arc;

use tokio::time::{timeout_at, Duration, Instant};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::SolverError;
use crate::infrastructure::PageRenderer;
use crate::models::{
    Answer, ExtractedQuestion, ProcessedDataset, QuizTask, RetrievedFile, SubmissionOutcome,
    TaskBrief,
};
use crate::utils::truncate_text;
use crate::workflow::{QuizCtx, QuizFlow};

/// 单个测验步骤内跨状态携带的数据
#[derive(Debug)]
pub struct StepData {
    pub url: String,
    pub question: ExtractedQuestion,
    pub brief: TaskBrief,
}

/// 测验链状态机
///
/// 每个状态携带进入该状态所需的全部数据，转换由 `ChainRunner::advance` 完成。
#[derive(Debug)]
pub enum ChainState {
    /// 渲染测验页面
    Fetching { url: String },
    /// 从页面中提取题目
    Extracting { url: String, html: String },
    /// 解读任务并下载数据文件
    Retrieving { url: String, question: ExtractedQuestion },
    /// 把文件处理成结构化数据集
    Processing { step: StepData, files: Vec<RetrievedFile> },
    /// 推理答案（attempt 为答错后的重试序号）
    Reasoning {
        step: StepData,
        datasets: Vec<ProcessedDataset>,
        feedback: Option<String>,
        attempt: usize,
    },
    /// 提交答案
    Submitting {
        step: StepData,
        datasets: Vec<ProcessedDataset>,
        answer: Answer,
        attempt: usize,
    },
    /// 根据提交响应决定下一步
    Chaining {
        step: StepData,
        datasets: Vec<ProcessedDataset>,
        outcome: SubmissionOutcome,
        attempt: usize,
    },
    /// 链正常结束
    Done,
    /// 链以错误终止
    Failed(SolverError),
}

impl ChainState {
    fn is_terminal(&self) -> bool {
        matches!(self, ChainState::Done | ChainState::Failed(_))
    }
}

/// 一条测验链的最终结局
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ChainOutcome {
    /// 仍在运行（仅中间态）
    #[default]
    InProgress,
    /// 链走到尽头且最后一次提交被接受
    Completed,
    /// 某一步在本地重试耗尽后失败
    Failed(String),
    /// 超出全局时间预算
    DeadlineExceeded,
}

/// 一次提交的记录
#[derive(Debug, Clone)]
pub struct AnswerRecord {
    pub url: String,
    pub answer: serde_json::Value,
    pub correct: bool,
}

/// 一条测验链的运行报告
#[derive(Debug, Default)]
pub struct ChainReport {
    pub quizzes_attempted: usize,
    pub quizzes_correct: usize,
    pub history: Vec<AnswerRecord>,
    pub outcome: ChainOutcome,
}

/// 测验链执行器
pub struct ChainRunner {
    config: Arc<Config>,
    renderer: Arc<PageRenderer>,
    flow: QuizFlow,
}

impl ChainRunner {
    pub fn new(config: Arc<Config>, renderer: Arc<PageRenderer>) -> Result<Self, SolverError> {
        let flow = QuizFlow::new(&config)?;
        Ok(Self {
            config,
            renderer,
            flow,
        })
    }

    /// 运行一条测验链直到结束或超时
    pub async fn run(&self, task: QuizTask) -> ChainReport {
        let deadline = Instant::now() + Duration::from_secs(self.config.chain_deadline_secs);
        let started = Instant::now();

        log_chain_start(&task);

        let mut report = ChainReport::default();
        if timeout_at(deadline, self.drive(task.url.clone(), deadline, &mut report))
            .await
            .is_err()
        {
            // 到点时正在进行的子操作被协作取消
            warn!("⏰ 全局时间预算耗尽，取消正在进行的操作");
            report.outcome = ChainOutcome::DeadlineExceeded;
        }

        log_chain_finish(&report, started.elapsed());
        report
    }

    /// 状态机主循环
    ///
    /// 每次转换前先检查全局时限；到点后无条件转入 `Failed(DeadlineExceeded)`。
    pub async fn drive(&self, start_url: String, deadline: Instant, report: &mut ChainReport) {
        let mut state = ChainState::Fetching { url: start_url };

        loop {
            match state {
                ChainState::Done => {
                    report.outcome = ChainOutcome::Completed;
                    return;
                }
                ChainState::Failed(e) => {
                    report.outcome = match e {
                        SolverError::DeadlineExceeded => ChainOutcome::DeadlineExceeded,
                        other => {
                            error!("❌ 测验链失败: {}", other);
                            ChainOutcome::Failed(other.to_string())
                        }
                    };
                    return;
                }
                other => {
                    if Instant::now() >= deadline {
                        state = ChainState::Failed(SolverError::DeadlineExceeded);
                        continue;
                    }
                    state = self.advance(other, report).await;
                }
            }
        }
    }

    /// 执行一次状态转换
    async fn advance(&self, state: ChainState, report: &mut ChainReport) -> ChainState {
        match state {
            ChainState::Fetching { url } => {
                report.quizzes_attempted += 1;
                let ctx = QuizCtx::new(report.quizzes_attempted, url.clone());
                info!("{} 🌐 抓取测验页面...", ctx);
                match self.renderer.render(&url).await {
                    Ok(html) => ChainState::Extracting { url, html },
                    Err(e) => ChainState::Failed(e),
                }
            }

            ChainState::Extracting { url, html } => match self.flow.extract(&html) {
                Ok(question) => {
                    info!("📝 题目: {}", truncate_text(&question.text, 120));
                    ChainState::Retrieving { url, question }
                }
                Err(e) => ChainState::Failed(e),
            },

            ChainState::Retrieving { url, question } => {
                let brief = match self.flow.draft_brief(&question).await {
                    Ok(brief) => brief,
                    Err(e) => return ChainState::Failed(e),
                };
                info!(
                    "🔍 任务类型: {} / 期望格式: {}",
                    brief.task_type, brief.answer_format
                );
                let files = self.flow.retrieve(&question, &brief).await;
                ChainState::Processing {
                    step: StepData { url, question, brief },
                    files,
                }
            }

            ChainState::Processing { step, files } => {
                let datasets = self.flow.process(&files);
                if files.len() > datasets.len() {
                    warn!(
                        "⚠️ {} 个文件中有 {} 个处理失败，以部分数据继续",
                        files.len(),
                        files.len() - datasets.len()
                    );
                }
                ChainState::Reasoning {
                    step,
                    datasets,
                    feedback: None,
                    attempt: 0,
                }
            }

            ChainState::Reasoning {
                step,
                datasets,
                feedback,
                attempt,
            } => {
                if attempt > 0 {
                    info!("🔁 带反馈重新推理 (第 {} 次)", attempt);
                }
                let value = match self
                    .flow
                    .reason(&step.question, &step.brief, &datasets, feedback.as_deref())
                    .await
                {
                    Ok(value) => value,
                    Err(e) => return ChainState::Failed(e),
                };
                let submit_url =
                    match self.flow.submission_url(&step.url, &step.question, &step.brief) {
                        Ok(url) => url,
                        Err(e) => return ChainState::Failed(e),
                    };
                info!("💡 得到答案: {}", truncate_text(&value.to_string(), 120));
                ChainState::Submitting {
                    step,
                    datasets,
                    answer: Answer { value, submit_url },
                    attempt,
                }
            }

            ChainState::Submitting {
                step,
                datasets,
                answer,
                attempt,
            } => {
                let outcome = match self
                    .flow
                    .submit(&answer, &step.url, &step.brief.expected_answer_key)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => return ChainState::Failed(e),
                };
                report.history.push(AnswerRecord {
                    url: step.url.clone(),
                    answer: answer.value.clone(),
                    correct: outcome.correct,
                });
                if outcome.correct {
                    report.quizzes_correct += 1;
                }
                ChainState::Chaining {
                    step,
                    datasets,
                    outcome,
                    attempt,
                }
            }

            ChainState::Chaining {
                step,
                datasets,
                outcome,
                attempt,
            } => after_submission(
                step,
                datasets,
                outcome,
                attempt,
                self.config.wrong_answer_retries,
            ),

            terminal => terminal,
        }
    }
}

/// 根据提交响应决定下一个状态
///
/// - 答对 + 有下一题 → 回到 `Fetching`
/// - 答对 + 没有下一题 → `Done`
/// - 答错 + 重试额度未用完 → 带反馈回到 `Reasoning`（不重新抓取页面）
/// - 答错 + 额度耗尽但给了下一题 → 跟随下一题继续
/// - 答错 + 额度耗尽且没有下一题 → `Failed`
fn after_submission(
    step: StepData,
    datasets: Vec<ProcessedDataset>,
    outcome: SubmissionOutcome,
    attempt: usize,
    max_wrong_retries: usize,
) -> ChainState {
    if outcome.correct {
        info!("✅ 答案正确");
        return match outcome.next_url {
            Some(next) => {
                info!("🔗 进入下一个测验: {}", next);
                ChainState::Fetching { url: next }
            }
            None => {
                info!("🏁 测验链完成");
                ChainState::Done
            }
        };
    }

    warn!("⚠️ 答案被判错: {:?}", outcome.reason);

    if attempt < max_wrong_retries {
        return ChainState::Reasoning {
            step,
            datasets,
            feedback: outcome
                .reason
                .or_else(|| Some("The previous answer was wrong.".to_string())),
            attempt: attempt + 1,
        };
    }

    match outcome.next_url {
        Some(next) => {
            warn!("答错重试耗尽，跟随下一题继续: {}", next);
            ChainState::Fetching { url: next }
        }
        None => ChainState::Failed(SolverError::SubmissionError(
            "答案被判错且重试额度已耗尽".to_string(),
        )),
    }
}

// ========== 日志辅助函数 ==========

fn log_chain_start(task: &QuizTask) {
    info!("{}", "=".repeat(60));
    info!("🚀 开始求解测验链: {}", task.url);
    info!(
        "开始时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
}

fn log_chain_finish(report: &ChainReport, elapsed: Duration) {
    info!("{}", "=".repeat(60));
    info!("📊 测验链结束: {:?}", report.outcome);
    info!(
        "✅ 答对 {}/{} (耗时 {:.1}s)",
        report.quizzes_correct,
        report.quizzes_attempted,
        elapsed.as_secs_f64()
    );
    info!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(url: &str) -> StepData {
        StepData {
            url: url.to_string(),
            question: ExtractedQuestion {
                text: "q".to_string(),
                resource_urls: vec![],
                submit_url: Some(format!("{}/submit", url)),
            },
            brief: TaskBrief::default(),
        }
    }

    fn outcome(correct: bool, next_url: Option<&str>, reason: Option<&str>) -> SubmissionOutcome {
        SubmissionOutcome {
            correct,
            next_url: next_url.map(|s| s.to_string()),
            reason: reason.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_correct_with_next_url_reenters_fetching() {
        let next = after_submission(
            step("https://x/q1"),
            vec![],
            outcome(true, Some("https://x/q2"), None),
            0,
            2,
        );
        match next {
            ChainState::Fetching { url } => assert_eq!(url, "https://x/q2"),
            other => panic!("期望 Fetching，得到 {:?}", other),
        }
    }

    #[test]
    fn test_correct_without_next_url_is_done() {
        let next = after_submission(step("https://x/q1"), vec![], outcome(true, None, None), 0, 2);
        assert!(matches!(next, ChainState::Done));
    }

    #[test]
    fn test_wrong_answer_loops_back_to_reasoning_with_feedback() {
        let next = after_submission(
            step("https://x/q1"),
            vec![],
            outcome(false, None, Some("expected a number")),
            0,
            2,
        );
        match next {
            ChainState::Reasoning {
                feedback, attempt, ..
            } => {
                assert_eq!(feedback.as_deref(), Some("expected a number"));
                assert_eq!(attempt, 1);
            }
            other => panic!("期望 Reasoning，得到 {:?}", other),
        }
    }

    #[test]
    fn test_wrong_answer_retries_are_bounded() {
        let next = after_submission(
            step("https://x/q1"),
            vec![],
            outcome(false, None, Some("still wrong")),
            2,
            2,
        );
        assert!(matches!(
            next,
            ChainState::Failed(SolverError::SubmissionError(_))
        ));
    }

    #[test]
    fn test_wrong_answer_exhausted_follows_next_url() {
        let next = after_submission(
            step("https://x/q1"),
            vec![],
            outcome(false, Some("https://x/q2"), Some("wrong")),
            2,
            2,
        );
        assert!(matches!(next, ChainState::Fetching { .. }));
    }

    #[tokio::test]
    async fn test_elapsed_deadline_fails_without_fetching() {
        let config = Arc::new(Config::default());
        let renderer = Arc::new(PageRenderer::new(&config));
        let runner = ChainRunner::new(config, renderer.clone()).unwrap();

        let mut report = ChainReport::default();
        let deadline = Instant::now() - Duration::from_secs(1);
        runner
            .drive("https://x/q1".to_string(), deadline, &mut report)
            .await;

        assert_eq!(report.outcome, ChainOutcome::DeadlineExceeded);
        assert_eq!(report.quizzes_attempted, 0);
        // 浏览器从未被启动，说明没有发起过任何抓取
        assert!(!renderer.is_ready());
    }

    #[test]
    fn test_answer_record_keeps_submitted_value() {
        let record = AnswerRecord {
            url: "https://x/q1".to_string(),
            answer: json!(80),
            correct: true,
        };
        assert_eq!(record.answer, json!(80));
    }
}

//! 单个测验的处理能力 - 流程层
//!
//! 把"一个测验步骤"需要的业务能力收拢到一处：
//! 提取题目 → 解读任务 → 下载文件 → 结构化处理 → 推理 → 提交。
//!
//! 本层只依赖业务能力（services），不持有浏览器资源，
//! 状态推进和时限控制由编排层负责。

use serde_json::Value as JsonValue;
use tracing::{info, warn};
use url::Url;

use crate::config::Config;
use crate::error::{SolverError, SolverResult};
use crate::models::{
    Answer, ExtractedQuestion, ProcessedDataset, RetrievedFile, SubmissionOutcome, TaskBrief,
    Verdict,
};
use crate::services::{
    arithmetic, AnswerSubmitter, DataProcessor, FileRetriever, LlmService, QuestionExtractor,
};

/// 单个测验的处理能力集合
pub struct QuizFlow {
    extractor: QuestionExtractor,
    retriever: FileRetriever,
    processor: DataProcessor,
    llm: LlmService,
    submitter: AnswerSubmitter,
}

impl QuizFlow {
    pub fn new(config: &Config) -> SolverResult<Self> {
        Ok(Self {
            extractor: QuestionExtractor::new()?,
            retriever: FileRetriever::new(config),
            processor: DataProcessor::new()?,
            llm: LlmService::new(config),
            submitter: AnswerSubmitter::new(config),
        })
    }

    /// 从渲染后的 HTML 中提取题目
    pub fn extract(&self, html: &str) -> SolverResult<ExtractedQuestion> {
        self.extractor.extract(html)
    }

    /// 让 LLM 解读题目，产出任务简报
    pub async fn draft_brief(&self, question: &ExtractedQuestion) -> SolverResult<TaskBrief> {
        self.llm.draft_brief(question).await
    }

    /// 下载题目和简报中引用的全部数据文件
    ///
    /// 单个文件失败只影响该文件，返回成功下载的部分。
    pub async fn retrieve(
        &self,
        question: &ExtractedQuestion,
        brief: &TaskBrief,
    ) -> Vec<RetrievedFile> {
        let mut urls = question.resource_urls.clone();
        for url in &brief.files_to_download {
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }
        self.retriever.retrieve_all(&urls).await
    }

    /// 把下载的文件处理成结构化数据集
    ///
    /// 不支持的格式记录后跳过（部分数据条件，不中止整个步骤）。
    pub fn process(&self, files: &[RetrievedFile]) -> Vec<ProcessedDataset> {
        let mut datasets = Vec::new();
        for file in files {
            match self.processor.process(file) {
                Ok(dataset) => datasets.push(dataset),
                Err(e) => warn!("⚠️ 文件处理失败，跳过: {} ({})", file.url, e),
            }
        }
        datasets
    }

    /// 推理出答案值
    ///
    /// 没有数据文件的简单算术题在本地直接求解；其余交给 LLM：
    /// 字面答案直接使用，统计指令在数据集上执行后得到答案。
    pub async fn reason(
        &self,
        question: &ExtractedQuestion,
        brief: &TaskBrief,
        datasets: &[ProcessedDataset],
        feedback: Option<&str>,
    ) -> SolverResult<JsonValue> {
        if feedback.is_none() && datasets.is_empty() {
            if let Some(value) = arithmetic::solve(&question.text) {
                info!("🧮 本地算术求解: {}", value);
                return Ok(number_value(value));
            }
        }

        let verdict = self.llm.reason(question, brief, datasets, feedback).await?;
        self.resolve(verdict, datasets)
    }

    /// 把推理结论落成字面答案值
    fn resolve(&self, verdict: Verdict, datasets: &[ProcessedDataset]) -> SolverResult<JsonValue> {
        match verdict {
            Verdict::Answer(value) => Ok(value),
            Verdict::Directive { op, column } => {
                info!("📐 执行分析指令: {} (列: {})", op, column);
                let mut last_error = None;
                for dataset in datasets {
                    for table in dataset.tables() {
                        match table.apply(op, &column) {
                            Ok(value) => return Ok(number_value(value)),
                            Err(e) => last_error = Some(e),
                        }
                    }
                }
                Err(last_error.unwrap_or_else(|| {
                    SolverError::ReasoningError(format!(
                        "没有可执行指令 {} 的表格数据 (列: {})",
                        op, column
                    ))
                }))
            }
        }
    }

    /// 确定答案提交地址
    ///
    /// 题目正文中的地址优先，LLM 简报兜底；相对地址基于测验页面解析为绝对地址。
    pub fn submission_url(
        &self,
        quiz_url: &str,
        question: &ExtractedQuestion,
        brief: &TaskBrief,
    ) -> SolverResult<String> {
        let candidate = question
            .submit_url
            .as_deref()
            .or(brief.submit_url.as_deref())
            .ok_or_else(|| SolverError::ParseError("未找到答案提交地址".to_string()))?;

        absolutize(quiz_url, candidate)
            .ok_or_else(|| SolverError::ParseError(format!("提交地址无法解析: {}", candidate)))
    }

    /// 提交答案
    pub async fn submit(
        &self,
        answer: &Answer,
        quiz_url: &str,
        answer_key: &str,
    ) -> SolverResult<SubmissionOutcome> {
        self.submitter.submit(answer, quiz_url, answer_key).await
    }
}

/// 浮点结果转为 JSON 数值（整数值落为整数）
fn number_value(value: f64) -> JsonValue {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        JsonValue::Number((value as i64).into())
    } else {
        serde_json::Number::from_f64(value)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(value.to_string()))
    }
}

/// 相对地址基于当前页面解析为绝对地址
fn absolutize(base: &str, candidate: &str) -> Option<String> {
    if let Ok(url) = Url::parse(candidate) {
        return Some(url.to_string());
    }
    let base = Url::parse(base).ok()?;
    base.join(candidate).ok().map(|u| u.to_string())
}

//! LLM 服务 - 业务能力层
//!
//! 只负责"向语言模型提问并解析回答"这一能力，不关心流程。
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 图片以 data URL 形式走 Vision API
//!
//! 两个上层能力都建立在通用的 `send_to_llm` 之上：
//! - `draft_brief`：让模型解读题目，产出结构化任务简报
//! - `reason`：让模型给出字面答案或一条统计指令

use std::str::FromStr;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use regex::Regex;
use serde_json::Value as JsonValue;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{SolverError, SolverResult};
use crate::models::{AnalysisOp, ExtractedQuestion, ProcessedDataset, TaskBrief, Verdict};

/// LLM 服务
///
/// 职责：
/// - 调用 LLM API 解读题目、推理答案
/// - 内部做有限次重试（带退避），重试耗尽返回 `ReasoningError`
/// - 不出现测验链、状态机等流程概念
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
    max_retries: usize,
    retry_backoff: Duration,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            max_retries: config.llm_max_retries.max(1),
            retry_backoff: Duration::from_millis(config.llm_retry_backoff_ms),
        }
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    /// - `image_urls`: 图片 data URL 列表（可选），会以 Vision 内容追加到用户消息
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（字符串）
    pub async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: Option<&str>,
        image_urls: Option<&[String]>,
    ) -> SolverResult<String> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(|e| SolverError::ReasoningError(format!("构建系统消息失败: {}", e)))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        // 构建用户消息内容（支持图片）
        let has_images = image_urls.map(|urls| !urls.is_empty()).unwrap_or(false);
        let user_msg = if has_images {
            let urls = image_urls.unwrap_or_default();
            let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();

            content_parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: user_message.to_string(),
                },
            ));
            for url in urls.iter() {
                content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: url.clone(),
                            detail: Some(ImageDetail::Auto),
                        },
                    },
                ));
            }
            debug!("使用 Vision API，包含 {} 张图片", urls.len());

            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                .build()
                .map_err(|e| SolverError::ReasoningError(format!("构建用户消息失败: {}", e)))?
        } else {
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_message)
                .build()
                .map_err(|e| SolverError::ReasoningError(format!("构建用户消息失败: {}", e)))?
        };
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.1)
            .max_tokens(4000u32)
            .build()
            .map_err(|e| SolverError::ReasoningError(format!("构建请求失败: {}", e)))?;

        // 有限次重试 + 线性退避
        let mut last_error = String::new();
        for attempt in 0..self.max_retries {
            match self.client.chat().create(request.clone()).await {
                Ok(response) => {
                    let content = response
                        .choices
                        .first()
                        .and_then(|choice| choice.message.content.clone());
                    match content {
                        Some(text) if !text.trim().is_empty() => {
                            debug!("LLM API 调用成功");
                            return Ok(text.trim().to_string());
                        }
                        _ => {
                            last_error = "LLM 返回内容为空".to_string();
                            warn!("{} (尝试 {}/{})", last_error, attempt + 1, self.max_retries);
                        }
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        "LLM API 调用失败: {} (尝试 {}/{})",
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

        Err(SolverError::ReasoningError(format!(
            "已重试 {} 次: {}",
            self.max_retries, last_error
        )))
    }

    /// 让模型解读题目，产出结构化任务简报
    ///
    /// 响应无法解析时退回安全的默认简报，不中断流程。
    pub async fn draft_brief(&self, question: &ExtractedQuestion) -> SolverResult<TaskBrief> {
        let prompt = format!(
            r#"Parse this quiz question and extract key information.

Question:
{}

Provide a JSON response with:
- task_type: (download_file, web_scraping, data_analysis, api_call, visualization, text_processing)
- files_to_download: list of URLs to download
- submit_url: URL where the answer should be submitted
- answer_format: (number, string, boolean, json, base64_image)
- analysis_required: description of what analysis is needed
- expected_answer_key: the key name for the answer field (usually "answer")

Return only valid JSON, no markdown or explanations."#,
            question.text
        );

        let response = self.send_to_llm(&prompt, None, None).await?;

        match extract_json_block(&response).and_then(|v| serde_json::from_value(v).ok()) {
            Some(brief) => Ok(brief),
            None => {
                warn!("任务简报解析失败，使用默认简报");
                Ok(TaskBrief {
                    analysis_required: question.text.clone(),
                    ..TaskBrief::default()
                })
            }
        }
    }

    /// 对题目进行推理
    ///
    /// 返回字面答案或一条统计指令；上次提交被判错时把反馈一并带给模型。
    pub async fn reason(
        &self,
        question: &ExtractedQuestion,
        brief: &TaskBrief,
        datasets: &[ProcessedDataset],
        feedback: Option<&str>,
    ) -> SolverResult<Verdict> {
        let mut context = format!(
            "Question: {}\nTask type: {}\nAnalysis required: {}\n",
            question.text, brief.task_type, brief.analysis_required
        );

        if !datasets.is_empty() {
            context.push_str(&format!("\nDownloaded {} file(s):\n", datasets.len()));
            for (i, dataset) in datasets.iter().enumerate() {
                context.push_str(&format!("\nFile {}:\n{}\n", i + 1, dataset.summary()));
            }
        }

        if let Some(reason) = feedback {
            context.push_str(&format!(
                "\nA previous answer was rejected with this feedback: {}\nTake it into account and correct the mistake.\n",
                reason
            ));
        }

        context.push_str(&format!(
            r#"
Respond with a single JSON object and nothing else.
Either give the final answer directly:
  {{"answer": <value in format "{}">}}
Or, if the answer must be computed from a downloaded table, give a directive:
  {{"directive": {{"op": "sum|mean|max|min|count", "column": "<column name>"}}}}
Be precise and accurate."#,
            brief.answer_format
        ));

        // 图片数据集走 Vision API
        let image_urls: Vec<String> = datasets
            .iter()
            .filter_map(|d| d.image_data_url())
            .collect();
        let images = if image_urls.is_empty() {
            None
        } else {
            Some(image_urls.as_slice())
        };

        let response = self
            .send_to_llm(
                &context,
                Some("You are a precise quiz-solving assistant. Follow the output format exactly."),
                images,
            )
            .await?;

        Ok(parse_verdict(&response, &brief.answer_format))
    }
}

/// 从响应中提取第一个 JSON 对象
fn extract_json_block(response: &str) -> Option<JsonValue> {
    let re = Regex::new(r"(?s)\{.*\}").ok()?;
    let block = re.find(response)?.as_str();
    serde_json::from_str(block).ok()
}

/// 解析推理响应
///
/// 优先按 JSON 结论解析（answer / directive 两种形式），
/// 解析失败时按期望格式从自由文本中抽取答案。
fn parse_verdict(response: &str, answer_format: &str) -> Verdict {
    if let Some(value) = extract_json_block(response) {
        if let Some(directive) = value.get("directive") {
            let op = directive
                .get("op")
                .and_then(|v| v.as_str())
                .and_then(|s| AnalysisOp::from_str(s).ok());
            let column = directive
                .get("column")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            if let (Some(op), Some(column)) = (op, column) {
                return Verdict::Directive { op, column };
            }
            warn!("指令字段不完整，退回文本答案抽取");
        }
        if let Some(answer) = value.get("answer") {
            return Verdict::Answer(answer.clone());
        }
    }

    Verdict::Answer(extract_answer(response, answer_format))
}

/// 按期望格式从自由文本中抽取答案
fn extract_answer(response: &str, answer_format: &str) -> JsonValue {
    match answer_format {
        "number" => {
            // 取最后一个数字（通常是最终答案）
            if let Ok(re) = Regex::new(r"-?\d+\.?\d*") {
                if let Some(m) = re.find_iter(response).last() {
                    let text = m.as_str();
                    if text.contains('.') {
                        if let Some(n) = text.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                            return JsonValue::Number(n);
                        }
                    } else if let Ok(n) = text.parse::<i64>() {
                        return JsonValue::Number(n.into());
                    }
                }
            }
            JsonValue::String(response.trim().to_string())
        }
        "boolean" => {
            let lower = response.to_lowercase();
            JsonValue::Bool(lower.contains("true") || lower.contains("yes"))
        }
        "json" => extract_json_block(response)
            .unwrap_or_else(|| JsonValue::String(response.trim().to_string())),
        _ => JsonValue::String(response.trim().to_string()),
    }
}

//! 测验数据模型
//!
//! 定义一次测验求解过程中流转的所有数据结构：
//! 入站任务 → 提取出的题目 → 下载的文件 → 结构化数据集 → 推理结论 → 答案

use std::fmt::Display;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::models::table::DataTable;

/// 入站测验任务（来自 POST /quiz 请求体）
///
/// 创建后不可变，生命周期为一次完整的编排运行。
#[derive(Debug, Clone, Deserialize)]
pub struct QuizTask {
    pub email: String,
    pub secret: String,
    pub url: String,
}

/// 题目载荷的来源形式
///
/// 页面里的题目要么以 base64 编码块嵌入（`atob('...')`），
/// 要么直接是可见文本。两种形式都是一等情况，解析一次后下游不再分支。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionPayload {
    /// base64 解码得到的题目文本
    Encoded(String),
    /// 页面可见文本
    Plain(String),
}

impl QuestionPayload {
    pub fn text(&self) -> &str {
        match self {
            QuestionPayload::Encoded(t) | QuestionPayload::Plain(t) => t,
        }
    }
}

/// 从渲染后的页面中提取出的题目
///
/// 每个测验步骤派生一次，之后只读。
#[derive(Debug, Clone)]
pub struct ExtractedQuestion {
    /// 题目原文
    pub text: String,
    /// 题目中引用的数据文件地址
    pub resource_urls: Vec<String>,
    /// 答案提交地址（可能需要 LLM 补充）
    pub submit_url: Option<String>,
}

/// 下载文件的推断格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Pdf,
    Csv,
    Excel,
    Image,
    Json,
    Html,
    Text,
    Unknown,
}

impl FileFormat {
    /// 根据 content-type 头和 URL 扩展名推断文件格式
    ///
    /// content-type 优先，扩展名兜底。
    pub fn classify(content_type: &str, url: &str) -> Self {
        let ct = content_type.to_lowercase();
        let path = url.split(&['?', '#'][..]).next().unwrap_or(url).to_lowercase();

        if ct.contains("pdf") || path.ends_with(".pdf") {
            FileFormat::Pdf
        } else if ct.contains("csv") || path.ends_with(".csv") {
            FileFormat::Csv
        } else if ct.contains("spreadsheet")
            || ct.contains("excel")
            || path.ends_with(".xlsx")
            || path.ends_with(".xls")
        {
            FileFormat::Excel
        } else if ct.contains("image")
            || path.ends_with(".png")
            || path.ends_with(".jpg")
            || path.ends_with(".jpeg")
        {
            FileFormat::Image
        } else if ct.contains("json") || path.ends_with(".json") {
            FileFormat::Json
        } else if ct.contains("html") || path.ends_with(".html") || path.ends_with(".htm") {
            FileFormat::Html
        } else if ct.starts_with("text/") || path.ends_with(".txt") {
            FileFormat::Text
        } else {
            FileFormat::Unknown
        }
    }
}

impl Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileFormat::Pdf => "pdf",
            FileFormat::Csv => "csv",
            FileFormat::Excel => "excel",
            FileFormat::Image => "image",
            FileFormat::Json => "json",
            FileFormat::Html => "html",
            FileFormat::Text => "text",
            FileFormat::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// 下载到内存的原始文件
///
/// 处理成 `ProcessedDataset` 后即丢弃。
#[derive(Debug, Clone)]
pub struct RetrievedFile {
    pub url: String,
    pub bytes: Vec<u8>,
    pub format: FileFormat,
}

/// 结构化后的数据集
///
/// 由数据处理器产出，推理引擎消费一次，不跨测验步骤缓存。
#[derive(Debug, Clone)]
pub enum ProcessedDataset {
    /// 表格数据（CSV / Excel）
    Table { source: String, table: DataTable },
    /// 文档（PDF：正文 + 嗅探出的表格）
    Document {
        source: String,
        text: String,
        tables: Vec<DataTable>,
    },
    /// 图片（base64，供视觉推理）
    Image {
        source: String,
        base64: String,
        media_type: String,
    },
    /// JSON 嵌套结构
    Json { source: String, value: JsonValue },
    /// 纯文本
    Text { source: String, text: String },
}

impl ProcessedDataset {
    pub fn source(&self) -> &str {
        match self {
            ProcessedDataset::Table { source, .. }
            | ProcessedDataset::Document { source, .. }
            | ProcessedDataset::Image { source, .. }
            | ProcessedDataset::Json { source, .. }
            | ProcessedDataset::Text { source, .. } => source,
        }
    }

    /// 数据集中可用于执行分析指令的表格
    pub fn tables(&self) -> &[DataTable] {
        match self {
            ProcessedDataset::Table { table, .. } => std::slice::from_ref(table),
            ProcessedDataset::Document { tables, .. } => tables,
            _ => &[],
        }
    }

    /// 图片的 data URL（供 Vision API 使用）
    pub fn image_data_url(&self) -> Option<String> {
        match self {
            ProcessedDataset::Image {
                base64, media_type, ..
            } => Some(format!("data:{};base64,{}", media_type, base64)),
            _ => None,
        }
    }

    /// 用于构建提示词的可读摘要
    pub fn summary(&self) -> String {
        match self {
            ProcessedDataset::Table { source, table } => {
                format!("Table from {}:\n{}", source, table.summary())
            }
            ProcessedDataset::Document {
                source,
                text,
                tables,
            } => {
                let preview: String = text.chars().take(1500).collect();
                format!(
                    "Document from {} ({} detected table(s)):\n{}",
                    source,
                    tables.len(),
                    preview
                )
            }
            ProcessedDataset::Image { source, .. } => {
                format!("Image from {} (attached for visual inspection)", source)
            }
            ProcessedDataset::Json { source, value } => {
                let rendered = serde_json::to_string(value).unwrap_or_default();
                let preview: String = rendered.chars().take(1500).collect();
                format!("JSON from {}:\n{}", source, preview)
            }
            ProcessedDataset::Text { source, text } => {
                let preview: String = text.chars().take(1500).collect();
                format!("Text from {} ({} chars):\n{}", source, text.len(), preview)
            }
        }
    }
}

/// LLM 对题目的结构化解读
#[derive(Debug, Clone, Deserialize)]
pub struct TaskBrief {
    /// 任务类型（download_file / web_scraping / data_analysis / ...）
    #[serde(default)]
    pub task_type: String,
    /// 需要下载的文件地址
    #[serde(default)]
    pub files_to_download: Vec<String>,
    /// 答案提交地址
    #[serde(default)]
    pub submit_url: Option<String>,
    /// 期望的答案格式（number / string / boolean / json / base64_image）
    #[serde(default = "default_answer_format")]
    pub answer_format: String,
    /// 需要进行的分析描述
    #[serde(default)]
    pub analysis_required: String,
    /// 提交时答案字段的键名
    #[serde(default = "default_answer_key")]
    pub expected_answer_key: String,
}

fn default_answer_format() -> String {
    "string".to_string()
}

fn default_answer_key() -> String {
    "answer".to_string()
}

impl Default for TaskBrief {
    fn default() -> Self {
        Self {
            task_type: "unknown".to_string(),
            files_to_download: Vec::new(),
            submit_url: None,
            answer_format: default_answer_format(),
            analysis_required: String::new(),
            expected_answer_key: default_answer_key(),
        }
    }
}

/// 可对表格列执行的统计操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisOp {
    Sum,
    Mean,
    Max,
    Min,
    Count,
}

impl FromStr for AnalysisOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sum" | "total" => Ok(AnalysisOp::Sum),
            "mean" | "average" | "avg" => Ok(AnalysisOp::Mean),
            "max" | "maximum" => Ok(AnalysisOp::Max),
            "min" | "minimum" => Ok(AnalysisOp::Min),
            "count" => Ok(AnalysisOp::Count),
            other => Err(format!("未知的统计操作: {}", other)),
        }
    }
}

impl Display for AnalysisOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AnalysisOp::Sum => "sum",
            AnalysisOp::Mean => "mean",
            AnalysisOp::Max => "max",
            AnalysisOp::Min => "min",
            AnalysisOp::Count => "count",
        };
        write!(f, "{}", name)
    }
}

/// 推理引擎的结论
///
/// 要么直接给出字面答案，要么给出一条需要对表格数据执行的分析指令。
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// 字面答案
    Answer(JsonValue),
    /// 分析指令：对某列执行统计操作
    Directive { op: AnalysisOp, column: String },
}

/// 待提交的答案
#[derive(Debug, Clone)]
pub struct Answer {
    pub value: JsonValue,
    pub submit_url: String,
}

/// 提交响应的解析结果
#[derive(Debug, Clone, Default)]
pub struct SubmissionOutcome {
    /// 答案是否正确
    pub correct: bool,
    /// 下一个测验的地址（链式测验）
    pub next_url: Option<String>,
    /// 答错时的反馈说明
    pub reason: Option<String>,
}

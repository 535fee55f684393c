//! 题目提取 - 业务能力层
//!
//! 只负责"从渲染后的页面中找出题目"这一件事，不关心流程。
//!
//! 页面里的题目有两种一等形式：
//! 1. base64 编码块嵌在 `atob('...')` 调用中，解码后得到题目文本
//! 2. 可见文本直接就是题目（常见容器：div#result / div.question / body）
//!
//! 两种形式解析一次落到 `QuestionPayload`，下游不再重复分支判断。

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{SolverError, SolverResult};
use crate::models::{ExtractedQuestion, QuestionPayload};

/// 可见文本短于该长度时认为不是有效题目
const MIN_QUESTION_LEN: usize = 10;

/// 兜底时保留的原始页面前缀长度
const RAW_FALLBACK_LEN: usize = 2000;

/// 题目提取器
pub struct QuestionExtractor {
    atob_re: Regex,
    container_res: Vec<Regex>,
    tag_re: Regex,
    space_re: Regex,
    resource_re: Regex,
    submit_re: Regex,
}

impl QuestionExtractor {
    pub fn new() -> SolverResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| SolverError::ParseError(format!("正则编译失败: {}", e)))
        };

        Ok(Self {
            atob_re: compile(r#"atob\(['"]([^'"]+)['"]\)"#)?,
            container_res: vec![
                compile(r#"(?is)<div[^>]*id=["']result["'][^>]*>(.*?)</div>"#)?,
                compile(r#"(?is)<div[^>]*class=["']question["'][^>]*>(.*?)</div>"#)?,
                compile(r#"(?is)<body[^>]*>(.*?)</body>"#)?,
            ],
            tag_re: compile(r"<[^>]+>")?,
            space_re: compile(r"\s+")?,
            resource_re: compile(
                r#"https?://[^\s"'<>)]+\.(?:csv|xlsx|xls|pdf|png|jpe?g|json|txt|html?)\b"#,
            )?,
            submit_re: compile(r#"https?://[^\s"'<>]+/submit[^\s"'<>]*"#)?,
        })
    }

    /// 从渲染后的 HTML 中提取题目
    pub fn extract(&self, html: &str) -> SolverResult<ExtractedQuestion> {
        let payload = self.locate_payload(html)?;
        match &payload {
            QuestionPayload::Encoded(_) => debug!("题目来源: base64 编码块"),
            QuestionPayload::Plain(_) => debug!("题目来源: 页面可见文本"),
        }

        let text = payload.text().to_string();
        let resource_urls = self.find_resource_urls(&text);
        let submit_url = self.find_submit_url(&text);

        Ok(ExtractedQuestion {
            text,
            resource_urls,
            submit_url,
        })
    }

    /// 定位题目载荷：编码块优先，可见文本兜底
    fn locate_payload(&self, html: &str) -> SolverResult<QuestionPayload> {
        // 1. base64 编码块
        if let Some(cap) = self.atob_re.captures(html) {
            match STANDARD.decode(&cap[1]) {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(decoded) if !decoded.trim().is_empty() => {
                        return Ok(QuestionPayload::Encoded(decoded));
                    }
                    _ => warn!("base64 块不是有效的 UTF-8 文本，回退到可见文本"),
                },
                Err(e) => warn!("base64 解码失败: {}，回退到可见文本", e),
            }
        }

        // 2. 常见题目容器
        for re in &self.container_res {
            if let Some(cap) = re.captures(html) {
                let text = self.strip_tags(&cap[1]);
                if text.chars().count() > MIN_QUESTION_LEN {
                    return Ok(QuestionPayload::Plain(text));
                }
            }
        }

        // 3. 兜底：整页去标签后取前缀
        let text = self.strip_tags(html);
        if text.is_empty() {
            return Err(SolverError::ParseError(
                "页面中没有可用的题目文本".to_string(),
            ));
        }
        Ok(QuestionPayload::Plain(
            text.chars().take(RAW_FALLBACK_LEN).collect(),
        ))
    }

    /// 去除 HTML 标签并折叠空白
    fn strip_tags(&self, html: &str) -> String {
        let no_tags = self.tag_re.replace_all(html, " ");
        self.space_re.replace_all(&no_tags, " ").trim().to_string()
    }

    /// 题目中引用的数据文件地址（保序去重）
    fn find_resource_urls(&self, text: &str) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for m in self.resource_re.find_iter(text) {
            let url = m.as_str().to_string();
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        urls
    }

    /// 题目中出现的提交地址
    fn find_submit_url(&self, text: &str) -> Option<String> {
        self.submit_re
            .find(text)
            .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> QuestionExtractor {
        QuestionExtractor::new().unwrap()
    }

    #[test]
    fn test_encoded_question_round_trips() {
        let question = "What is the sum of 2 and 3? Submit to https://quiz.example.com/submit";
        let encoded = STANDARD.encode(question);
        let html = format!(
            r#"<html><body><script>document.body.innerHTML = atob('{}');</script></body></html>"#,
            encoded
        );

        let extracted = extractor().extract(&html).unwrap();
        assert_eq!(extracted.text, question);
        assert_eq!(
            extracted.submit_url.as_deref(),
            Some("https://quiz.example.com/submit")
        );
    }

    #[test]
    fn test_plain_question_from_result_div() {
        let html = r#"<html><body><div id="result">Compute the <b>average</b> of column score.</div></body></html>"#;
        let extracted = extractor().extract(html).unwrap();
        assert_eq!(extracted.text, "Compute the average of column score.");
    }

    #[test]
    fn test_plain_question_from_body_fallback() {
        let html = "<html><body><p>How many rows does the table have in total?</p></body></html>";
        let extracted = extractor().extract(html).unwrap();
        assert!(!extracted.text.is_empty());
        assert!(extracted.text.contains("How many rows"));
    }

    #[test]
    fn test_invalid_base64_falls_back_to_visible_text() {
        let html = r#"<body><script>x = atob('!!!not-base64!!!');</script><div id="result">Fallback question text here.</div></body>"#;
        let extracted = extractor().extract(html).unwrap();
        assert_eq!(extracted.text, "Fallback question text here.");
    }

    #[test]
    fn test_resource_urls_found_in_question() {
        let question = "Download https://x.example.com/data.csv and https://x.example.com/doc.pdf then answer.";
        let encoded = STANDARD.encode(question);
        let html = format!("<body><script>atob('{}')</script></body>", encoded);

        let extracted = extractor().extract(&html).unwrap();
        assert_eq!(
            extracted.resource_urls,
            vec![
                "https://x.example.com/data.csv".to_string(),
                "https://x.example.com/doc.pdf".to_string(),
            ]
        );
    }

    #[test]
    fn test_repeated_resource_urls_are_deduplicated() {
        let question = "Use https://x.example.com/data.csv and https://x.example.com/doc.pdf, \
            then cross-check against https://x.example.com/data.csv again.";
        let encoded = STANDARD.encode(question);
        let html = format!("<body><script>atob('{}')</script></body>", encoded);

        let extracted = extractor().extract(&html).unwrap();
        assert_eq!(
            extracted.resource_urls,
            vec![
                "https://x.example.com/data.csv".to_string(),
                "https://x.example.com/doc.pdf".to_string(),
            ]
        );
    }

    #[test]
    fn test_page_urls_count_as_resources() {
        let question = "Scrape the table at https://x.example.com/stats.html and report the sum.";
        let encoded = STANDARD.encode(question);
        let html = format!("<body><script>atob('{}')</script></body>", encoded);

        let extracted = extractor().extract(&html).unwrap();
        assert_eq!(
            extracted.resource_urls,
            vec!["https://x.example.com/stats.html".to_string()]
        );
    }

    #[test]
    fn test_empty_page_is_a_parse_error() {
        let result = extractor().extract("<html><body></body></html>");
        assert!(matches!(result, Err(SolverError::ParseError(_))));
    }
}

//! 数据处理 - 业务能力层
//!
//! 把下载到内存的原始文件转换成可供推理使用的结构化数据集：
//! - CSV / Excel → 行列表格
//! - PDF → 正文文本 + 嗅探出的表格
//! - 网页 → 正文文本 + `<table>` 中提取出的表格
//! - 图片 → base64（供视觉推理）
//! - JSON → 嵌套结构
//! - 纯文本 → UTF-8 解码
//!
//! 无法识别的格式返回 `UnsupportedFormat`，
//! 编排层将其视为部分数据缺失而非整体失败。

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use calamine::{open_workbook_auto_from_rs, Reader};
use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::{SolverError, SolverResult};
use crate::models::{DataTable, FileFormat, ProcessedDataset, RetrievedFile};

/// 数据处理器
pub struct DataProcessor {
    table_re: Regex,
    row_re: Regex,
    cell_re: Regex,
    tag_re: Regex,
    space_re: Regex,
}

impl DataProcessor {
    pub fn new() -> SolverResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| SolverError::ParseError(format!("正则编译失败: {}", e)))
        };

        Ok(Self {
            table_re: compile(r"(?is)<table[^>]*>(.*?)</table>")?,
            row_re: compile(r"(?is)<tr[^>]*>(.*?)</tr>")?,
            cell_re: compile(r"(?is)<t[hd][^>]*>(.*?)</t[hd]>")?,
            tag_re: compile(r"<[^>]+>")?,
            space_re: compile(r"\s+")?,
        })
    }

    /// 按推断格式处理单个文件
    pub fn process(&self, file: &RetrievedFile) -> SolverResult<ProcessedDataset> {
        debug!("处理文件: {} (格式: {})", file.url, file.format);
        match file.format {
            FileFormat::Csv => self.process_csv(file),
            FileFormat::Excel => self.process_excel(file),
            FileFormat::Pdf => self.process_pdf(file),
            FileFormat::Image => Ok(self.process_image(file)),
            FileFormat::Json => self.process_json(file),
            FileFormat::Html => Ok(self.process_html(file)),
            FileFormat::Text => Ok(self.process_text(file)),
            FileFormat::Unknown => Err(SolverError::UnsupportedFormat(file.url.clone())),
        }
    }

    fn process_csv(&self, file: &RetrievedFile) -> SolverResult<ProcessedDataset> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(file.bytes.as_slice());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| SolverError::ParseError(format!("CSV 表头解析失败: {}", e)))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| SolverError::ParseError(format!("CSV 行解析失败: {}", e)))?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        Ok(ProcessedDataset::Table {
            source: file.url.clone(),
            table: DataTable::new(headers, rows),
        })
    }

    fn process_excel(&self, file: &RetrievedFile) -> SolverResult<ProcessedDataset> {
        let cursor = Cursor::new(file.bytes.clone());
        let mut workbook = open_workbook_auto_from_rs(cursor)
            .map_err(|e| SolverError::ParseError(format!("Excel 打开失败: {}", e)))?;

        // 取第一个工作表
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| SolverError::ParseError("Excel 中没有工作表".to_string()))?
            .map_err(|e| SolverError::ParseError(format!("Excel 工作表读取失败: {}", e)))?;

        let mut iter = range.rows();
        let headers: Vec<String> = iter
            .next()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .unwrap_or_default();
        let rows: Vec<Vec<String>> = iter
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();

        Ok(ProcessedDataset::Table {
            source: file.url.clone(),
            table: DataTable::new(headers, rows),
        })
    }

    fn process_pdf(&self, file: &RetrievedFile) -> SolverResult<ProcessedDataset> {
        let text = pdf_extract::extract_text_from_mem(&file.bytes)
            .map_err(|e| SolverError::ParseError(format!("PDF 文本提取失败: {}", e)))?;

        let tables = sniff_tables(&text);
        if !tables.is_empty() {
            debug!("PDF 中嗅探到 {} 个表格", tables.len());
        }

        Ok(ProcessedDataset::Document {
            source: file.url.clone(),
            text,
            tables,
        })
    }

    fn process_html(&self, file: &RetrievedFile) -> ProcessedDataset {
        let html = String::from_utf8_lossy(&file.bytes).to_string();
        let tables = self.extract_html_tables(&html);
        if !tables.is_empty() {
            debug!("网页中提取到 {} 个表格", tables.len());
        }

        ProcessedDataset::Document {
            source: file.url.clone(),
            text: self.strip_tags(&html),
            tables,
        }
    }

    /// 提取网页中的 `<table>` 元素为表格数据
    ///
    /// 首个 `<tr>` 作为表头，其余作为数据行；不足两行的表格丢弃。
    fn extract_html_tables(&self, html: &str) -> Vec<DataTable> {
        let mut tables = Vec::new();
        for table_cap in self.table_re.captures_iter(html) {
            let mut rows: Vec<Vec<String>> = Vec::new();
            for row_cap in self.row_re.captures_iter(&table_cap[1]) {
                let cells: Vec<String> = self
                    .cell_re
                    .captures_iter(&row_cap[1])
                    .map(|c| self.strip_tags(&c[1]))
                    .collect();
                if !cells.is_empty() {
                    rows.push(cells);
                }
            }
            if rows.len() >= 2 {
                let headers = rows.remove(0);
                tables.push(DataTable::new(headers, rows));
            }
        }
        tables
    }

    /// 去除 HTML 标签并折叠空白
    fn strip_tags(&self, html: &str) -> String {
        let no_tags = self.tag_re.replace_all(html, " ");
        self.space_re.replace_all(&no_tags, " ").trim().to_string()
    }

    fn process_image(&self, file: &RetrievedFile) -> ProcessedDataset {
        let media_type = if file.url.to_lowercase().ends_with(".png") {
            "image/png"
        } else {
            "image/jpeg"
        };

        ProcessedDataset::Image {
            source: file.url.clone(),
            base64: STANDARD.encode(&file.bytes),
            media_type: media_type.to_string(),
        }
    }

    fn process_json(&self, file: &RetrievedFile) -> SolverResult<ProcessedDataset> {
        let value: JsonValue = serde_json::from_slice(&file.bytes)
            .map_err(|e| SolverError::ParseError(format!("JSON 解析失败: {}", e)))?;

        Ok(ProcessedDataset::Json {
            source: file.url.clone(),
            value,
        })
    }

    fn process_text(&self, file: &RetrievedFile) -> ProcessedDataset {
        let text = String::from_utf8_lossy(&file.bytes).to_string();
        if text.contains('\u{FFFD}') {
            warn!("文本文件包含无法解码的字节: {}", file.url);
        }

        ProcessedDataset::Text {
            source: file.url.clone(),
            text,
        }
    }
}

/// 从 PDF 正文中嗅探表格
///
/// 连续多行、每行用制表符或两个以上空格分出相同列数（≥2 列）时视为一张表，
/// 首行作为表头。
fn sniff_tables(text: &str) -> Vec<DataTable> {
    let mut tables = Vec::new();
    let mut block: Vec<Vec<String>> = Vec::new();

    let flush = |block: &mut Vec<Vec<String>>, tables: &mut Vec<DataTable>| {
        // 至少表头 + 两行数据才算表格
        if block.len() >= 3 {
            let headers = block[0].clone();
            let rows = block[1..].to_vec();
            tables.push(DataTable::new(headers, rows));
        }
        block.clear();
    };

    for line in text.lines() {
        let cells = split_cells(line);
        match (cells.len() >= 2, block.first()) {
            (true, None) => block.push(cells),
            (true, Some(first)) if first.len() == cells.len() => block.push(cells),
            _ => flush(&mut block, &mut tables),
        }
    }
    flush(&mut block, &mut tables);

    tables
}

/// 按制表符或 2+ 空格切分一行
fn split_cells(line: &str) -> Vec<String> {
    line.split(|c: char| c == '\t')
        .flat_map(|part| part.split("  "))
        .map(|cell| cell.trim().to_string())
        .filter(|cell| !cell.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisOp;

    fn processor() -> DataProcessor {
        DataProcessor::new().unwrap()
    }

    fn file(url: &str, bytes: &[u8], format: FileFormat) -> RetrievedFile {
        RetrievedFile {
            url: url.to_string(),
            bytes: bytes.to_vec(),
            format,
        }
    }

    #[test]
    fn test_csv_becomes_table() {
        let csv = b"name,score\nalice,80\nbob,90\ncarol,70\n";
        let dataset = processor()
            .process(&file("https://x/data.csv", csv, FileFormat::Csv))
            .unwrap();

        let tables = dataset.tables();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].headers, vec!["name", "score"]);
        assert_eq!(tables[0].rows.len(), 3);
    }

    #[test]
    fn test_csv_mean_directive_round_trip() {
        let csv = b"name,score\nalice,80\nbob,90\ncarol,70\n";
        let dataset = processor()
            .process(&file("https://x/data.csv", csv, FileFormat::Csv))
            .unwrap();

        let mean = dataset.tables()[0].apply(AnalysisOp::Mean, "score").unwrap();
        assert!((mean - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_json_is_parsed() {
        let payload = br#"{"answer": 42, "items": [1, 2, 3]}"#;
        let dataset = processor()
            .process(&file("https://x/a.json", payload, FileFormat::Json))
            .unwrap();

        match dataset {
            ProcessedDataset::Json { value, .. } => {
                assert_eq!(value["answer"], 42);
                assert_eq!(value["items"].as_array().unwrap().len(), 3);
            }
            other => panic!("期望 Json 数据集，得到 {:?}", other),
        }
    }

    #[test]
    fn test_broken_json_is_a_parse_error() {
        let result = processor().process(&file(
            "https://x/a.json",
            b"{not json",
            FileFormat::Json,
        ));
        assert!(matches!(result, Err(SolverError::ParseError(_))));
    }

    #[test]
    fn test_unknown_format_is_unsupported() {
        let result = processor().process(&file(
            "https://x/blob.bin",
            &[0u8, 1, 2],
            FileFormat::Unknown,
        ));
        assert!(matches!(result, Err(SolverError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_image_becomes_base64() {
        let dataset = processor()
            .process(&file("https://x/pic.png", b"ABC", FileFormat::Image))
            .unwrap();
        assert_eq!(
            dataset.image_data_url().unwrap(),
            "data:image/png;base64,QUJD"
        );
    }

    #[test]
    fn test_html_tables_become_data_tables() {
        let html = b"<html><body><p>Scores</p>\
            <table><tr><th>name</th><th>score</th></tr>\
            <tr><td>alice</td><td>80</td></tr>\
            <tr><td>bob</td><td>90</td></tr></table></body></html>";
        let dataset = processor()
            .process(&file("https://x/page.html", html, FileFormat::Html))
            .unwrap();

        let tables = dataset.tables();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].headers, vec!["name", "score"]);
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(tables[0].apply(AnalysisOp::Sum, "score").unwrap(), 170.0);
    }

    #[test]
    fn test_html_without_tables_keeps_text() {
        let html = b"<html><body><h1>Notice</h1><p>No tables on this page.</p></body></html>";
        let dataset = processor()
            .process(&file("https://x/page.html", html, FileFormat::Html))
            .unwrap();

        assert!(dataset.tables().is_empty());
        match dataset {
            ProcessedDataset::Document { text, .. } => {
                assert!(text.contains("No tables on this page."));
            }
            other => panic!("期望 Document 数据集，得到 {:?}", other),
        }
    }

    #[test]
    fn test_sniff_tables_from_document_text() {
        let text = "Quarterly report\n\nregion  revenue\nnorth  120\nsouth  80\n\nEnd of report.";
        let tables = sniff_tables(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].headers, vec!["region", "revenue"]);
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(
            tables[0].apply(AnalysisOp::Sum, "revenue").unwrap(),
            200.0
        );
    }

    #[test]
    fn test_sniff_ignores_prose() {
        let text = "This is a paragraph of prose.\nIt has no tabular structure at all.\n";
        assert!(sniff_tables(text).is_empty());
    }
}

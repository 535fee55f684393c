//! 表格数据模型
//!
//! CSV / Excel / PDF 表格统一落到 `DataTable`，
//! 分析指令（sum / mean / max / min / count）直接在其上执行。

use crate::error::{SolverError, SolverResult};
use crate::models::quiz::AnalysisOp;

/// 行列结构的表格数据
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 按列名查找列索引（忽略大小写和首尾空白）
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let target = name.trim().to_lowercase();
        self.headers
            .iter()
            .position(|h| h.trim().to_lowercase() == target)
    }

    /// 提取某列中所有可解析为数字的值
    pub fn numeric_column(&self, name: &str) -> SolverResult<Vec<f64>> {
        let idx = self.column_index(name).ok_or_else(|| {
            SolverError::ReasoningError(format!("表格中不存在列: {}", name))
        })?;

        let values: Vec<f64> = self
            .rows
            .iter()
            .filter_map(|row| row.get(idx))
            .filter_map(|cell| cell.trim().parse::<f64>().ok())
            .collect();

        if values.is_empty() {
            return Err(SolverError::ReasoningError(format!(
                "列 {} 中没有可用的数值",
                name
            )));
        }
        Ok(values)
    }

    /// 对某列执行统计操作
    ///
    /// `count` 统计行数，不要求该列是数值列。
    pub fn apply(&self, op: AnalysisOp, column: &str) -> SolverResult<f64> {
        if op == AnalysisOp::Count {
            return Ok(self.rows.len() as f64);
        }

        let values = self.numeric_column(column)?;
        let result = match op {
            AnalysisOp::Sum => values.iter().sum(),
            AnalysisOp::Mean => values.iter().sum::<f64>() / values.len() as f64,
            AnalysisOp::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            AnalysisOp::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            AnalysisOp::Count => unreachable!(),
        };
        Ok(result)
    }

    /// 用于构建提示词的可读摘要：行列数、列名与前几行预览
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} rows x {} columns\ncolumns: {}\n",
            self.rows.len(),
            self.headers.len(),
            self.headers.join(", ")
        );
        for row in self.rows.iter().take(5) {
            out.push_str(&row.join(" | "));
            out.push('\n');
        }
        if self.rows.len() > 5 {
            out.push_str("...\n");
        }
        out
    }
}

//! 错误类型定义
//!
//! 整个求解流程共用一套错误分类：
//! - 入站请求错误（`Unauthorized` / `BadRequest`）直接映射为 HTTP 状态码
//! - 步骤级错误（抓取 / 推理 / 提交）在各自的服务内部有限次重试，
//!   重试耗尽后以终态错误结束当前测验链
//! - `DeadlineExceeded` 优先级最高，每次状态转换前都会检查

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// 求解器错误分类
#[derive(Debug, Error)]
pub enum SolverError {
    /// 密钥不匹配
    #[error("密钥校验失败")]
    Unauthorized,

    /// 请求体缺失或结构非法
    #[error("请求体格式错误: {0}")]
    BadRequest(String),

    /// 页面渲染超出子时限
    #[error("页面渲染超时: {url}")]
    FetchTimeout { url: String },

    /// 导航或网络失败
    #[error("页面抓取失败 ({url}): {source}")]
    FetchError {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    /// 无法从页面中定位题目文本
    #[error("题目解析失败: {0}")]
    ParseError(String),

    /// 无法识别的文件格式
    #[error("不支持的文件格式: {0}")]
    UnsupportedFormat(String),

    /// LLM 调用失败或响应无法解析
    #[error("推理失败: {0}")]
    ReasoningError(String),

    /// 答案提交失败
    #[error("答案提交失败: {0}")]
    SubmissionError(String),

    /// 超出整条测验链的时间预算
    #[error("已超出全局时间限制")]
    DeadlineExceeded,
}

impl SolverError {
    /// 对应的 HTTP 状态码（仅入站错误会真正返回给调用方）
    pub fn status_code(&self) -> StatusCode {
        match self {
            SolverError::Unauthorized => StatusCode::FORBIDDEN,
            SolverError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SolverError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

/// 求解器结果类型
pub type SolverResult<T> = std::result::Result<T, SolverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_maps_to_403() {
        assert_eq!(SolverError::Unauthorized.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_bad_request_maps_to_400() {
        let err = SolverError::BadRequest("missing field".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_step_errors_map_to_500() {
        let err = SolverError::ReasoningError("empty response".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            SolverError::DeadlineExceeded.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

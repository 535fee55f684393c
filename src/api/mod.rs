//! 入站 HTTP 接口
//!
//! - `POST /quiz`：接收测验任务。请求体非法返回 400（先于密钥检查），
//!   密钥不匹配返回 403，通过后返回 200 并在后台任务中运行测验链。
//! - `GET /health`：健康检查，报告浏览器是否就绪。

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::SolverError;
use crate::models::QuizTask;

/// 构建路由
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/quiz", post(submit_quiz))
        .route("/health", get(health_check))
        .with_state(state)
}

/// 接收测验任务
///
/// 密钥门：请求体先于密钥被校验；任何与配置不符的密钥一律 403，
/// 不泄露进一步信息，也不触发任何抓取。
async fn submit_quiz(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QuizTask>, JsonRejection>,
) -> axum::response::Response {
    let Json(task) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!("请求体非法: {}", rejection.body_text());
            return SolverError::BadRequest(rejection.body_text()).into_response();
        }
    };

    if task.secret != state.config.shared_secret {
        warn!("密钥校验失败 (email: {})", task.email);
        return SolverError::Unauthorized.into_response();
    }

    info!("✓ 任务已接受: {}", task.url);

    // 测验链在后台任务中运行，在全局时限内完成并记录结果
    let runner = state.runner.clone();
    tokio::spawn(async move {
        runner.run(task).await;
    });

    (StatusCode::OK, Json(json!({ "status": "accepted" }))).into_response()
}

/// 健康检查
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "solver_ready": state.renderer.is_ready(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::Config;

    async fn test_router() -> Router {
        let state = AppState::new(Config::default()).unwrap();
        create_router(Arc::new(state))
    }

    fn quiz_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/quiz")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_wrong_secret_is_403() {
        let app = test_router().await;
        let body = r#"{"email": "a@b.edu", "secret": "WRONG", "url": "https://x"}"#;
        let response = app.oneshot(quiz_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_wrong_secret_is_403_regardless_of_extra_fields() {
        let app = test_router().await;
        let body = r#"{"email": "a@b.edu", "secret": "WRONG", "url": "https://x", "extra": [1, 2]}"#;
        let response = app.oneshot(quiz_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_malformed_json_is_400() {
        let app = test_router().await;
        let response = app.oneshot(quiz_request("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_fields_are_400() {
        let app = test_router().await;
        let response = app
            .oneshot(quiz_request(r#"{"email": "a@b.edu"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_valid_request_is_accepted() {
        // 时间预算为 0：后台测验链在第一次状态转换前就超时终止，
        // 不会真正去启动浏览器
        let state = Arc::new(
            AppState::new(Config {
                chain_deadline_secs: 0,
                ..Config::default()
            })
            .unwrap(),
        );
        let app = create_router(state.clone());

        let body = r#"{"email": "a@b.edu", "secret": "Alpha", "url": "https://x"}"#;
        let response = app.oneshot(quiz_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // 让后台任务跑完，确认没有发起过任何抓取
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!state.renderer.is_ready());
    }

    #[tokio::test]
    async fn test_health_reports_solver_ready() {
        let app = test_router().await;
        let request = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        // 浏览器懒启动，服务刚起时尚未就绪
        assert_eq!(body["solver_ready"], false);
    }
}

//! # Quiz Solver
//!
//! 一个自动求解测验链的 Rust 服务：接收测验 URL，用无头浏览器渲染页面，
//! 提取题目（base64 编码或可见文本），下载并处理引用的数据文件，
//! 调用 LLM 推理出答案并提交，跟随返回的下一题直到链结束或超时。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Browser），只暴露能力
//! - `PageRenderer` - 唯一的浏览器 owner，提供 render() 能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个测验步骤
//! - `QuestionExtractor` - 题目提取能力
//! - `FileRetriever` / `DataProcessor` - 数据文件获取与结构化能力
//! - `arithmetic` - 简单算术题的本地求解
//! - `LlmService` - LLM 推理能力
//! - `AnswerSubmitter` - 答案提交能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个测验步骤"的能力集合
//! - `QuizCtx` - 上下文封装（链序号 + 页面地址）
//! - `QuizFlow` - 能力编排（extract → retrieve → process → reason → submit）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/chain_runner` - 以显式状态机驱动整条测验链，
//!   管理全局时限与答错重试
//!
//! 入站 HTTP 接口（`api/`）做密钥门禁，通过后把测验链交给编排层。

pub mod api;
pub mod app;
pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::{App, AppState};
pub use browser::launch_headless_browser;
pub use config::Config;
pub use error::{SolverError, SolverResult};
pub use infrastructure::PageRenderer;
pub use models::{Answer, ExtractedQuestion, QuizTask};
pub use orchestrator::{ChainOutcome, ChainReport, ChainRunner};
pub use workflow::{QuizCtx, QuizFlow};

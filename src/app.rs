//! 应用装配与启动

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::api;
use crate::config::Config;
use crate::error::SolverError;
use crate::infrastructure::PageRenderer;
use crate::orchestrator::ChainRunner;

/// 进程级共享状态
///
/// 配置在启动后只读；浏览器资源池跨请求共享，
/// 除此之外并发请求之间没有共享可变状态。
pub struct AppState {
    pub config: Arc<Config>,
    pub renderer: Arc<PageRenderer>,
    pub runner: Arc<ChainRunner>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, SolverError> {
        let config = Arc::new(config);
        let renderer = Arc::new(PageRenderer::new(&config));
        let runner = Arc::new(ChainRunner::new(config.clone(), renderer.clone())?);
        Ok(Self {
            config,
            renderer,
            runner,
        })
    }
}

/// 应用主结构
pub struct App {
    state: Arc<AppState>,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);
        let state = Arc::new(AppState::new(config)?);
        Ok(Self { state })
    }

    /// 运行 HTTP 服务
    pub async fn run(&self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.state.config.listen_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("✅ 服务已监听: {}", addr);

        let router = api::create_router(self.state.clone());
        axum::serve(listener, router).await?;
        Ok(())
    }
}

// ========== 日志辅助函数 ==========

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 测验求解服务启动");
    info!("📊 全局时间预算: {} 秒", config.chain_deadline_secs);
    info!("🧠 模型: {} @ {}", config.llm_model_name, config.llm_api_base_url);
    info!("{}", "=".repeat(60));
}

//! 页面渲染器 - 基础设施层
//!
//! 持有唯一的浏览器资源，只暴露"渲染页面"的能力。
//!
//! 浏览器是进程级共享的有限资源：
//! - 实例懒启动，第一次渲染时才真正拉起浏览器
//! - 用信号量限制同时打开的页面数量
//! - 页面只在渲染期间持有，渲染结束立即关闭释放

use std::time::Duration;

use chromiumoxide::Browser;
use tokio::sync::{OnceCell, Semaphore};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::browser::launch_headless_browser;
use crate::config::Config;
use crate::error::{SolverError, SolverResult};

/// 页面脚本执行的固定等待时间
const SCRIPT_SETTLE_MS: u64 = 2000;

/// 页面渲染器
///
/// 职责：
/// - 持有唯一的 Browser 资源（懒启动）
/// - 暴露 render() 能力
/// - 不认识题目和测验流程
pub struct PageRenderer {
    browser: OnceCell<Browser>,
    permits: Semaphore,
    fetch_timeout: Duration,
}

impl PageRenderer {
    pub fn new(config: &Config) -> Self {
        Self {
            browser: OnceCell::new(),
            permits: Semaphore::new(config.max_concurrent_pages),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
        }
    }

    /// 浏览器是否已经启动
    pub fn is_ready(&self) -> bool {
        self.browser.initialized()
    }

    /// 渲染页面并返回最终的 HTML
    ///
    /// 执行页面内嵌脚本后取回文档内容。
    /// 超出子时限返回 `FetchTimeout`，导航失败返回 `FetchError`。
    /// 本层不做重试，重试与否由编排层决定。
    pub async fn render(&self, url: &str) -> SolverResult<String> {
        let _permit = self.permits.acquire().await.map_err(|e| {
            SolverError::FetchError {
                url: url.to_string(),
                source: anyhow::anyhow!("浏览器资源池已关闭: {}", e),
            }
        })?;

        let browser = self
            .browser
            .get_or_try_init(launch_headless_browser)
            .await
            .map_err(|e| SolverError::FetchError {
                url: url.to_string(),
                source: e,
            })?;

        debug!("开始渲染页面: {}", url);

        let render = async {
            let page = browser.new_page(url).await?;
            page.wait_for_navigation().await?;
            // 等待页面脚本执行完成（题目常由 JS 动态生成）
            sleep(Duration::from_millis(SCRIPT_SETTLE_MS)).await;
            let html = page.content().await?;
            if let Err(e) = page.close().await {
                warn!("关闭页面失败: {}", e);
            }
            anyhow::Ok(html)
        };

        match timeout(self.fetch_timeout, render).await {
            Ok(Ok(html)) => {
                info!("✓ 页面渲染完成: {} ({} 字符)", url, html.len());
                Ok(html)
            }
            Ok(Err(e)) => Err(SolverError::FetchError {
                url: url.to_string(),
                source: e,
            }),
            Err(_) => Err(SolverError::FetchTimeout {
                url: url.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_starts_lazy() {
        let renderer = PageRenderer::new(&Config::default());
        assert!(!renderer.is_ready());
    }
}

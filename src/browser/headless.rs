use anyhow::Result;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// 启动无头浏览器
///
/// 浏览器实例在整个进程内共享，页面由调用方按需创建。
pub async fn launch_headless_browser() -> Result<Browser> {
    info!("🚀 启动无头浏览器...");

    // 配置无头浏览器
    let config = BrowserConfig::builder()
        .new_headless_mode()
        .args(vec![
            "--disable-gpu",             // 无头模式下禁用 GPU
            "--no-sandbox",              // 禁用沙盒，防止权限问题导致的崩溃
            "--disable-dev-shm-usage",   // 防止共享内存不足
            "--remote-debugging-port=0", // 让浏览器自动选择调试端口
        ])
        .build()
        .map_err(|e| {
            error!("配置无头浏览器失败: {}", e);
            anyhow::anyhow!("配置无头浏览器失败: {}", e)
        })?;

    // 启动浏览器
    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动无头浏览器失败: {}", e);
        anyhow::anyhow!("启动无头浏览器失败: {}", e)
    })?;
    debug!("无头浏览器启动成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    info!("✅ 无头浏览器就绪");

    Ok(browser)
}

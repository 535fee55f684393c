use anyhow::Result;
use quiz_solver::app::App;
use quiz_solver::config::Config;
use quiz_solver::utils::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    // 初始化并运行应用
    App::initialize(config)?.run().await?;

    Ok(())
}

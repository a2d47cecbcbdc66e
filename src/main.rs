use anyhow::Result;
use block_translator::orchestrator::App;
use block_translator::utils::logging;
use block_translator::Config;

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

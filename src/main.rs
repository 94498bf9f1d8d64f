use anyhow::{Context, Result};
use req_test_gen::{logger, App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let mut config = Config::load().context("加载配置失败")?;

    // 第一个命令行参数作为需求文档路径
    if let Some(document_path) = std::env::args().nth(1) {
        config.document_path = document_path;
    }

    // 初始化日志
    logger::init_with_verbose(config.verbose_logging);

    // 初始化并运行应用
    let summary = App::initialize(config).await?.run().await?;

    println!(
        "通过评审: {}/{}",
        summary.approved_count(),
        summary.total
    );

    Ok(())
}

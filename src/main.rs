use std::path::PathBuf;

use anyhow::Result;
use fig_to_psd::utils::logging;
use fig_to_psd::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logging::init(config.verbose_logging);

    // 命令行参数为待转换文件，没有则扫描输入目录
    let inputs: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();

    let stats = App::initialize(config).await?.run(inputs).await?;

    if !stats.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

//! study：命令行苏格拉底式学习伙伴
//!
//! 入口：初始化日志（stderr，默认 warn），解析命令行并分发。

use clap::Parser;
use study::cli::{run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    study::observability::init();
    run(Cli::parse()).await
}

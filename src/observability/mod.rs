//! 可观测性：tracing 订阅器初始化
//!
//! 日志写到 stderr，默认级别 warn，避免与对话输出交错；`RUST_LOG` 可覆盖。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_FILTER: &str = "warn";

pub fn init() {
    init_with(DEFAULT_FILTER);
}

/// 以给定默认过滤器初始化；重复初始化时静默忽略
pub fn init_with(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

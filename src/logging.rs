//! 日志初始化
//!
//! 运行时只通过 `tracing` 输出日志，由应用决定如何收集。这里提供一个
//! 基于 `tracing-subscriber` 的默认配置：读取 `RUST_LOG`，未设置时为 `info`。

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// 安装全局日志订阅者，重复调用不会报错
pub fn init() {
    init_with_default("info");
}

/// 安装全局日志订阅者，`RUST_LOG` 未设置时使用 `directives`
pub fn init_with_default(directives: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    let shown = filter.to_string();
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok();
    if installed {
        info!(filter = %shown, version = crate::VERSION, "Orbit 日志已初始化");
    } else {
        debug!("已存在全局日志订阅者，跳过初始化");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_with_default("debug");
        init();
    }
}

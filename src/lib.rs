//! # Orbit - 游戏服务器后端的 Loop/Actor 运行时
//!
//! Orbit 把业务状态划分到若干个独占线程的 Loop 上，Loop 内的状态只由该线程访问，
//! 跨 Loop 通过提交任务协作。
//!
//! ## 特性
//!
//! - 本线程内联执行、跨线程入队的任务提交
//! - 轮询、哈希、按负载排序的 Loop 选择
//! - 有嵌套上限的 Loop 内事件总线
//! - 自动重新布置的 cron 调度与固定频率/固定间隔 tick
//! - 实体注册时自动挂载实体及组件声明的处理器
//!
//! ## 快速开始
//!
//! ```rust,no_run,ignore
//! use orbit::prelude::*;
//! use std::rc::Rc;
//!
//! fn main() -> orbit::Result<()> {
//!     orbit::logging::init();
//!
//!     let config = LoopGroupConfig::from_file_with_env("orbit.toml")?;
//!     let group = LoopGroup::builder().config(config).build()?;
//!
//!     let lp = group.select_hashing("player-1").unwrap();
//!     lp.submit(|ctx| ctx.register_entity(Rc::new(BasicEntity::new("player-1"))))
//!         .join()?;
//!
//!     group.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## 模块组织
//!
//! - orbit_config - LoopGroupConfig 及环境变量覆盖
//! - orbit_core - 错误类型、时间单位、cron 求值
//! - orbit_runtime - Loop、LoopGroup、事件总线、调度器、实体注册

pub mod logging;

// ============================================================================
// Crate Re-exports
// ============================================================================

pub use orbit_config;
pub use orbit_core;
pub use orbit_runtime;

pub use orbit_config::LoopGroupConfig;
pub use orbit_core::{OrbitError, TimeUnit};
pub use orbit_runtime::{Loop, LoopContext, LoopFuture, LoopGroup, LoopGroupBuilder};

// ============================================================================
// Prelude Module
// ============================================================================

/// 预导出常用类型
///
/// 通过 `use orbit::prelude::*;` 导入所有常用类型
pub mod prelude {
    pub use orbit_config::{ConfigError, LoopGroupConfig};
    pub use orbit_core::prelude::*;
    pub use orbit_runtime::prelude::*;

    pub use crate::{Error, Result};
}

// ============================================================================
// Error Types
// ============================================================================

/// Orbit 统一错误类型
pub type Result<T> = std::result::Result<T, Error>;

/// Orbit 统一错误枚举
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 运行时错误
    #[error(transparent)]
    Core(#[from] orbit_core::OrbitError),

    /// 配置错误
    #[error(transparent)]
    Config(#[from] orbit_config::ConfigError),
}

// ============================================================================
// Version Information
// ============================================================================

/// Orbit 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Orbit 包名
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let err: Error = OrbitError::Cancelled.into();
        assert!(matches!(err, Error::Core(OrbitError::Cancelled)));

        let err: Error = orbit_config::ConfigError::Validation("bad".to_string()).into();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_error_display_is_transparent() {
        let err: Error = OrbitError::rejected("Loop 已关闭")
            .with_context(orbit_core::ErrorContext::in_loop("loop-0"))
            .into();
        assert_eq!(err.to_string(), "任务被拒绝: Loop 已关闭 (loop: loop-0)");
    }

    #[test]
    fn test_version_info() {
        assert_eq!(NAME, "orbit");
        assert!(!VERSION.is_empty());
    }
}

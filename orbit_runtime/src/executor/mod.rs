//! Loop 执行器
//!
//! - [`Loop`]：独占线程的任务队列
//! - [`LoopFuture`]：任务结果句柄
//! - [`LoopGroup`]：Loop 池与选择策略
//! - [`LoopGroupBuilder`]：从配置构建 LoopGroup

mod builder;
mod future;
mod group;
mod queue;
mod worker;

pub use builder::LoopGroupBuilder;
pub use future::LoopFuture;
pub use group::LoopGroup;
pub use queue::{Runnable, ScheduledHandle};
pub use worker::{DEFAULT_MAX_EVENT_DEPTH, Loop, LoopSettings};

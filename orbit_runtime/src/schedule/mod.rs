//! Loop 内定时触发
//!
//! [`Scheduler`] 按 cron 表达式触发，每次触发后自行计算下一次；
//! [`TickManager`] 按固定频率或固定间隔触发。
//! 处理器都会收到 `(now, prev)` 两个 Unix 毫秒时间戳，首次触发时 `prev` 为 -1。

mod cron;
mod tick;

pub use self::cron::Scheduler;
pub use self::tick::TickManager;

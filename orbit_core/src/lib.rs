//! Orbit 核心类型
//!
//! 提供统一错误类型、时间单位以及 cron 表达式求值接口。

pub mod cron;
pub mod error;
pub mod time;

// 导出主要类型到 crate root
pub use crate::cron::{CronEvaluator, CronScheduleEvaluator, TriggerHistory};
pub use crate::error::{ErrorContext, OrbitError, OrbitErrorKind, Result};
pub use crate::time::{TimeUnit, now_millis};

// 预导出
pub mod prelude {
    pub use crate::cron::{CronEvaluator, CronScheduleEvaluator, TriggerHistory};
    pub use crate::error::{ErrorContext, OrbitError, OrbitErrorKind, Result};
    pub use crate::time::{TimeUnit, now_millis};
}

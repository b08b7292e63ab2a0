//! cron 表达式求值
//!
//! Scheduler 只依赖 [`CronEvaluator`]，默认实现基于 `croner`：
//! 6 字段秒级精度（5 字段时秒为 0），支持 `L`/`W`/`#`/`?` 扩展，
//! 日与星期同时限定时两者都须满足。

use crate::error::{OrbitError, Result};
use crate::time::now_millis;
use chrono::{DateTime, Utc};
use croner::Cron;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// 触发历史
///
/// 同一表达式上的所有绑定共享一份历史。时间戳为 Unix 毫秒。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerHistory {
    last_scheduled: Option<i64>,
    last_actual: Option<i64>,
    last_completion: Option<i64>,
}

impl TriggerHistory {
    /// 记录一次触发
    pub fn record(&mut self, scheduled: i64, actual: i64, completion: i64) {
        self.last_scheduled = Some(scheduled);
        self.last_actual = Some(actual);
        self.last_completion = Some(completion);
    }

    /// 上一次计划触发时间
    pub fn last_scheduled(&self) -> Option<i64> {
        self.last_scheduled
    }

    /// 上一次实际触发时间
    pub fn last_actual(&self) -> Option<i64> {
        self.last_actual
    }

    /// 上一次执行完成时间
    pub fn last_completion(&self) -> Option<i64> {
        self.last_completion
    }

    /// 计算下一次触发的起点
    ///
    /// 以完成时间为准；若计划时间晚于完成时间（定时器提前唤醒）则取计划时间，
    /// 从未触发过时取 `now`。
    pub fn base_time(&self, now: i64) -> i64 {
        match (self.last_completion, self.last_scheduled) {
            (Some(completion), Some(scheduled)) => completion.max(scheduled),
            (Some(completion), None) => completion,
            (None, _) => now,
        }
    }
}

/// cron 求值器
pub trait CronEvaluator: Send + Sync {
    /// 计算下一次触发时间（Unix 毫秒），没有下一次时返回 `Ok(None)`
    fn next_fire_time(&self, expression: &str, history: &TriggerHistory) -> Result<Option<i64>>;
}

/// 基于 `croner` 的默认求值器
///
/// 解析结果按表达式缓存。
#[derive(Default)]
pub struct CronScheduleEvaluator {
    cache: Mutex<HashMap<String, Cron>>,
}

impl CronScheduleEvaluator {
    /// 创建求值器
    pub fn new() -> Self {
        Self::default()
    }

    /// 校验表达式
    pub fn validate(&self, expression: &str) -> Result<()> {
        let mut cache = self.cache.lock();
        Self::parsed(&mut cache, expression).map(|_| ())
    }

    fn parsed<'a>(cache: &'a mut HashMap<String, Cron>, expression: &str) -> Result<&'a Cron> {
        match cache.entry(expression.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let cron = Cron::new(expression)
                    .with_seconds_optional()
                    .with_dom_and_dow()
                    .parse()
                    .map_err(|e| OrbitError::cron(format!("{}: {}", expression, e)))?;
                Ok(entry.insert(cron))
            }
        }
    }
}

impl CronEvaluator for CronScheduleEvaluator {
    fn next_fire_time(&self, expression: &str, history: &TriggerHistory) -> Result<Option<i64>> {
        let mut cache = self.cache.lock();
        let cron = Self::parsed(&mut cache, expression)?;
        let base = history.base_time(now_millis());
        let Some(start) = DateTime::<Utc>::from_timestamp_millis(base) else {
            return Ok(None);
        };

        // 搜索到上限仍无匹配（如 2 月 30 日）视为没有下一次
        Ok(cron
            .find_next_occurrence(&start, false)
            .ok()
            .map(|t| t.timestamp_millis()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_second() {
        let evaluator = CronScheduleEvaluator::new();
        let now = now_millis();
        let next = evaluator
            .next_fire_time("*/1 * * * * *", &TriggerHistory::default())
            .unwrap()
            .unwrap();
        assert!(next > now);
        assert!(next - now <= 1_000);
        assert_eq!(next % 1_000, 0);
    }

    #[test]
    fn test_next_follows_completion() {
        let evaluator = CronScheduleEvaluator::new();
        let mut history = TriggerHistory::default();
        // 2030-01-01T00:00:00Z
        let scheduled = 1_893_456_000_000;
        history.record(scheduled, scheduled + 2, scheduled + 5);

        let next = evaluator.next_fire_time("*/10 * * * * *", &history).unwrap();
        assert_eq!(next, Some(scheduled + 10_000));
    }

    #[test]
    fn test_scheduled_later_than_completion() {
        let mut history = TriggerHistory::default();
        history.record(2_000, 1_990, 1_995);
        assert_eq!(history.base_time(0), 2_000);
        assert_eq!(TriggerHistory::default().base_time(42), 42);
    }

    #[test]
    fn test_invalid_expression() {
        let evaluator = CronScheduleEvaluator::new();
        let result = evaluator.next_fire_time("every now and then", &TriggerHistory::default());
        assert!(matches!(result, Err(OrbitError::Cron(_))));
        assert!(evaluator.validate("0 */5 * * * *").is_ok());
    }

    #[test]
    fn test_impossible_date_has_no_next() {
        let evaluator = CronScheduleEvaluator::new();
        let next = evaluator.next_fire_time("0 0 0 30 2 *", &TriggerHistory::default());
        assert!(!matches!(next, Ok(Some(_))));
    }

    fn next_after(expression: &str, base: &str) -> DateTime<Utc> {
        let base = DateTime::parse_from_rfc3339(base).unwrap().timestamp_millis();
        let mut history = TriggerHistory::default();
        history.record(base, base, base);
        let next = CronScheduleEvaluator::new()
            .next_fire_time(expression, &history)
            .unwrap()
            .unwrap();
        DateTime::<Utc>::from_timestamp_millis(next).unwrap()
    }

    #[test]
    fn test_last_day_of_month() {
        let next = next_after("0 0 12 L * *", "2030-02-10T00:00:00Z");
        assert_eq!(next.to_rfc3339(), "2030-02-28T12:00:00+00:00");
    }

    #[test]
    fn test_nearest_weekday() {
        // 2030-06-15 是星期六，最近的工作日是 14 日星期五
        let next = next_after("0 0 12 15W * *", "2030-06-01T00:00:00Z");
        assert_eq!(next.to_rfc3339(), "2030-06-14T12:00:00+00:00");
    }

    #[test]
    fn test_nth_weekday_of_month() {
        // 2030 年 3 月的第三个星期六是 16 日
        let next = next_after("0 0 12 ? * 6#3", "2030-03-01T00:00:00Z");
        assert_eq!(next.to_rfc3339(), "2030-03-16T12:00:00+00:00");
    }

    #[test]
    fn test_plain_weekday_still_supported() {
        // 2030-01-01 是星期二
        let next = next_after("0 0 12 * * MON", "2030-01-01T00:00:00Z");
        assert_eq!(next.to_rfc3339(), "2030-01-07T12:00:00+00:00");
    }
}

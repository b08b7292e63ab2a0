//! Loop 指标
//!
//! 每个 Loop 持有一份原子计数器；采样值可另外上报给外部的 [`MetricsSink`]。

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// 外部指标上报接口
pub trait MetricsSink: Send + Sync {
    /// 记录一次耗时
    fn record_timer(&self, name: &str, loop_id: &str, elapsed: Duration);

    /// 记录一个瞬时值
    fn record_gauge(&self, name: &str, loop_id: &str, value: f64);
}

/// 丢弃所有采样
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_timer(&self, _name: &str, _loop_id: &str, _elapsed: Duration) {}

    fn record_gauge(&self, _name: &str, _loop_id: &str, _value: f64) {}
}

/// Loop 运行计数
#[derive(Debug)]
pub struct LoopMetrics {
    tasks_submitted: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_rejected: AtomicU64,
    events_dispatched: AtomicU64,
    events_refused: AtomicU64,
    cron_fired: AtomicU64,
    ticks_fired: AtomicU64,
    /// 当前注册的实体数
    live_entities: AtomicUsize,
}

impl LoopMetrics {
    pub fn new() -> Self {
        Self {
            tasks_submitted: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_rejected: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            events_refused: AtomicU64::new(0),
            cron_fired: AtomicU64::new(0),
            ticks_fired: AtomicU64::new(0),
            live_entities: AtomicUsize::new(0),
        }
    }

    pub(crate) fn task_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_rejected(&self) {
        self.tasks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn event_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn event_refused(&self) {
        self.events_refused.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cron_fired(&self) {
        self.cron_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_tick_fired(&self) {
        self.ticks_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_live_entities(&self, count: usize) {
        self.live_entities.store(count, Ordering::Relaxed);
    }

    /// 提交的任务数
    pub fn tasks_submitted(&self) -> u64 {
        self.tasks_submitted.load(Ordering::Relaxed)
    }

    /// 正常完成的任务数
    pub fn tasks_completed(&self) -> u64 {
        self.tasks_completed.load(Ordering::Relaxed)
    }

    /// panic 的任务数
    pub fn tasks_failed(&self) -> u64 {
        self.tasks_failed.load(Ordering::Relaxed)
    }

    /// 因关闭被拒绝的任务数
    pub fn tasks_rejected(&self) -> u64 {
        self.tasks_rejected.load(Ordering::Relaxed)
    }

    /// 至少有一个绑定的事件派发次数
    pub fn events_dispatched(&self) -> u64 {
        self.events_dispatched.load(Ordering::Relaxed)
    }

    /// 因嵌套过深被拒绝的事件数
    pub fn events_refused(&self) -> u64 {
        self.events_refused.load(Ordering::Relaxed)
    }

    /// cron 触发次数
    pub fn cron_fired(&self) -> u64 {
        self.cron_fired.load(Ordering::Relaxed)
    }

    /// tick 触发次数
    pub fn ticks_fired(&self) -> u64 {
        self.ticks_fired.load(Ordering::Relaxed)
    }

    /// 当前注册的实体数
    pub fn live_entities(&self) -> usize {
        self.live_entities.load(Ordering::Relaxed)
    }

    /// 生成摘要报告
    pub fn summary(&self) -> String {
        format!(
            "Loop 指标:\n\
             - 提交任务: {}\n\
             - 完成任务: {}\n\
             - 失败任务: {}\n\
             - 拒绝任务: {}\n\
             - 派发事件: {}\n\
             - 拒绝事件: {}\n\
             - cron 触发: {}\n\
             - tick 触发: {}\n\
             - 实体数: {}",
            self.tasks_submitted(),
            self.tasks_completed(),
            self.tasks_failed(),
            self.tasks_rejected(),
            self.events_dispatched(),
            self.events_refused(),
            self.cron_fired(),
            self.ticks_fired(),
            self.live_entities()
        )
    }
}

impl Default for LoopMetrics {
    fn default() -> Self {
        Self::new()
    }
}

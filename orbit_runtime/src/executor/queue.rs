//! Loop 任务队列
//!
//! 立即任务与定时任务共用一个按 (截止时间, 序号) 排序的最小堆，
//! 因此同一 Loop 内的提交与定时触发保持 FIFO。

use crate::context::LoopContext;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

/// 一次性任务
pub(crate) type Job = Box<dyn FnOnce(&LoopContext) + Send + 'static>;

/// 周期任务
pub(crate) type PeriodicJob = Box<dyn FnMut(&LoopContext) + Send + 'static>;

/// 定时任务句柄
///
/// 取消后任务不会再执行；已在执行中的那一次不受影响。
#[derive(Clone, Debug, Default)]
pub struct ScheduledHandle {
    cancelled: Arc<AtomicBool>,
}

impl ScheduledHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 取消任务，返回本次调用是否真正改变了状态
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, AtomicOrdering::AcqRel)
    }

    /// 是否已取消
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::Acquire)
    }
}

/// 周期模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PeriodMode {
    /// 下一次截止时间 = 上一次截止时间 + 周期
    FixedRate,
    /// 下一次截止时间 = 完成时间 + 周期
    FixedDelay,
}

pub(crate) enum Work {
    Once(Job),
    Periodic {
        job: PeriodicJob,
        period: Duration,
        mode: PeriodMode,
    },
}

/// 队列条目
pub(crate) struct Entry {
    pub deadline: Instant,
    pub seq: u64,
    pub handle: Option<ScheduledHandle>,
    pub work: Work,
}

impl Entry {
    pub fn is_cancelled(&self) -> bool {
        self.handle.as_ref().is_some_and(ScheduledHandle::is_cancelled)
    }
}

// 反向比较，BinaryHeap 变为最小堆
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

/// 任务堆
#[derive(Default)]
pub(crate) struct TaskQueue {
    heap: BinaryHeap<Entry>,
    seq: u64,
}

impl TaskQueue {
    pub fn push(&mut self, deadline: Instant, handle: Option<ScheduledHandle>, work: Work) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Entry {
            deadline,
            seq,
            handle,
            work,
        });
    }

    /// 堆顶的截止时间
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.deadline)
    }

    /// 弹出已到期的条目
    pub fn pop_due(&mut self, now: Instant) -> Option<Entry> {
        match self.heap.peek() {
            Some(entry) if entry.deadline <= now => self.heap.pop(),
            _ => None,
        }
    }

    /// 取出全部条目，按执行顺序排列
    pub fn drain_ordered(&mut self) -> Vec<Entry> {
        let mut entries = std::mem::take(&mut self.heap).into_vec();
        entries.sort_by(|a, b| b.cmp(a));
        entries
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

/// `shutdown_now` 返回的未执行任务
///
/// 可以交给另一个 Loop 的 [`resubmit`](super::Loop::resubmit) 继续执行，
/// 原来的 [`LoopFuture`](super::LoopFuture) 由新 Loop 回填结果。
/// 直接丢弃时该句柄以 `Cancelled` 结束。
pub struct Runnable {
    pub(crate) job: Job,
}

impl fmt::Debug for Runnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runnable").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Work {
        Work::Once(Box::new(|_| {}))
    }

    #[test]
    fn test_queue_orders_by_deadline_then_seq() {
        let mut queue = TaskQueue::default();
        let now = Instant::now();
        queue.push(now + Duration::from_millis(5), None, noop());
        queue.push(now, None, noop());
        queue.push(now, None, noop());

        let first = queue.pop_due(now).unwrap();
        let second = queue.pop_due(now).unwrap();
        assert_eq!((first.seq, second.seq), (1, 2));
        assert!(queue.pop_due(now).is_none());
        assert_eq!(queue.next_deadline(), Some(now + Duration::from_millis(5)));
    }

    #[test]
    fn test_drain_ordered() {
        let mut queue = TaskQueue::default();
        let now = Instant::now();
        queue.push(now + Duration::from_millis(10), None, noop());
        queue.push(now, None, noop());

        let seqs: Vec<u64> = queue.drain_ordered().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 0]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_handle_cancel_once() {
        let handle = ScheduledHandle::new();
        assert!(!handle.is_cancelled());
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(handle.is_cancelled());
    }
}

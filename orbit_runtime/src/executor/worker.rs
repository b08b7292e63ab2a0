//! Loop 线程
//!
//! 每个 Loop 独占一个操作系统线程，按 FIFO 执行提交的任务和到期的定时任务。
//! Loop 拥有的可变状态（组件、事件/cron/tick 绑定、实体注册表）都放在
//! [`LoopContext`] 里，只在这个线程上存在。

use super::future::LoopFuture;
use super::group::LoopGroup;
use super::queue::{Entry, Job, PeriodMode, PeriodicJob, Runnable, ScheduledHandle, TaskQueue, Work};
use crate::context::{ComponentInstaller, LoopContext};
use crate::entity::Component;
use crate::metrics::{LoopMetrics, MetricsSink, NoopMetrics};
use orbit_core::{CronEvaluator, CronScheduleEvaluator, ErrorContext, OrbitError, Result};
use parking_lot::{Condvar, Mutex, RwLock};
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

thread_local! {
    /// 本线程所属 Loop 的上下文，只用于内联提交和组件访问
    static CURRENT: RefCell<Option<Rc<LoopContext>>> = const { RefCell::new(None) };
}

/// 默认事件嵌套深度
pub const DEFAULT_MAX_EVENT_DEPTH: usize = 20;

/// Loop 构造参数
#[derive(Clone)]
pub struct LoopSettings {
    /// 事件嵌套派发的最大深度
    pub max_event_depth: usize,
    /// cron 求值器
    pub evaluator: Arc<dyn CronEvaluator>,
    /// 指标上报
    pub metrics_sink: Arc<dyn MetricsSink>,
    /// 线程启动后依次执行的组件构造器
    pub components: Vec<ComponentInstaller>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_event_depth: DEFAULT_MAX_EVENT_DEPTH,
            evaluator: Arc::new(CronScheduleEvaluator::new()),
            metrics_sink: Arc::new(NoopMetrics),
            components: Vec::new(),
        }
    }
}

struct QueueState {
    queue: TaskQueue,
    shutdown: bool,
}

/// 单线程执行器
pub struct Loop {
    /// Loop ID
    id: String,
    /// 任务堆与关闭标记
    state: Mutex<QueueState>,
    /// 新任务或关闭时唤醒工作线程
    available: Condvar,
    /// 线程是否已退出
    terminated: Mutex<bool>,
    termination: Condvar,
    /// 工作线程 ID
    thread_id: OnceLock<ThreadId>,
    /// 是否正在本线程上执行任务
    executing: AtomicBool,
    /// 所属 LoopGroup
    group: RwLock<Weak<LoopGroup>>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
    metrics: LoopMetrics,
    metrics_sink: Arc<dyn MetricsSink>,
}

impl Loop {
    /// 创建 Loop 并启动工作线程
    pub fn spawn(id: impl Into<String>, settings: LoopSettings) -> Result<Arc<Self>> {
        let id = id.into();
        let lp = Arc::new(Self {
            id: id.clone(),
            state: Mutex::new(QueueState {
                queue: TaskQueue::default(),
                shutdown: false,
            }),
            available: Condvar::new(),
            terminated: Mutex::new(false),
            termination: Condvar::new(),
            thread_id: OnceLock::new(),
            executing: AtomicBool::new(false),
            group: RwLock::new(Weak::new()),
            join_handle: Mutex::new(None),
            metrics: LoopMetrics::new(),
            metrics_sink: Arc::clone(&settings.metrics_sink),
        });

        let worker = Arc::clone(&lp);
        let handle = thread::Builder::new()
            .name(id.clone())
            .spawn(move || worker.run_worker(settings))
            .map_err(|e| OrbitError::from(e).with_context(ErrorContext::in_loop(id)))?;
        *lp.join_handle.lock() = Some(handle);

        Ok(lp)
    }

    /// Loop ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 所属 LoopGroup
    pub fn group(&self) -> Option<Arc<LoopGroup>> {
        self.group.read().upgrade()
    }

    pub(crate) fn set_group(&self, group: Weak<LoopGroup>) {
        *self.group.write() = group;
    }

    /// 运行指标
    pub fn metrics(&self) -> &LoopMetrics {
        &self.metrics
    }

    pub(crate) fn metrics_sink(&self) -> &dyn MetricsSink {
        self.metrics_sink.as_ref()
    }

    /// 当前是否正在本 Loop 的线程上执行任务
    pub fn in_thread(&self) -> bool {
        self.thread_id
            .get()
            .is_some_and(|id| *id == thread::current().id())
            && self.executing.load(Ordering::Acquire)
    }

    /// 提交任务
    ///
    /// 已在本 Loop 线程上时内联执行，返回的句柄立即完成；否则入队，
    /// 由 Loop 线程回填结果。任务 panic 只会体现在句柄上。
    pub fn submit<T, F>(&self, f: F) -> LoopFuture<T>
    where
        T: Send + 'static,
        F: FnOnce(&LoopContext) -> T + Send + 'static,
    {
        self.metrics.task_submitted();

        if let Some(ctx) = self.current_context() {
            return LoopFuture::ready(self.capture(|| f(&ctx)));
        }

        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |ctx: &LoopContext| {
            let result = ctx.loop_handle().capture(|| f(ctx));
            let _ = tx.send(result);
        });

        match self.enqueue(Duration::ZERO, None, Work::Once(job)) {
            Ok(()) => LoopFuture::pending(rx),
            Err(e) => {
                self.metrics.task_rejected();
                LoopFuture::ready(Err(e))
            }
        }
    }

    /// 入队执行，不关心结果
    ///
    /// 即使在本 Loop 线程上也总是入队，可用于把工作推迟到当前任务之后。
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&LoopContext) + Send + 'static,
    {
        self.metrics.task_submitted();
        let job: Job = Box::new(move |ctx: &LoopContext| {
            let _ = ctx.loop_handle().capture(|| f(ctx));
        });

        self.enqueue(Duration::ZERO, None, Work::Once(job))
            .inspect_err(|_| self.metrics.task_rejected())
    }

    /// 接手其他 Loop `shutdown_now` 留下的任务
    ///
    /// 本 Loop 也已关闭时任务被丢弃，原句柄以 `Cancelled` 结束。
    pub fn resubmit(&self, task: Runnable) -> Result<()> {
        self.metrics.task_submitted();
        self.enqueue(Duration::ZERO, None, Work::Once(task.job))
            .inspect_err(|_| self.metrics.task_rejected())
    }

    /// 延迟执行
    pub fn schedule<F>(&self, delay: Duration, f: F) -> Result<ScheduledHandle>
    where
        F: FnOnce(&LoopContext) + Send + 'static,
    {
        let handle = ScheduledHandle::new();
        self.enqueue(delay, Some(handle.clone()), Work::Once(Box::new(f)))?;
        Ok(handle)
    }

    /// 固定频率执行：截止时间与任务耗时无关
    pub fn schedule_fixed_rate<F>(
        &self,
        initial_delay: Duration,
        period: Duration,
        f: F,
    ) -> Result<ScheduledHandle>
    where
        F: FnMut(&LoopContext) + Send + 'static,
    {
        self.schedule_periodic(initial_delay, period, PeriodMode::FixedRate, Box::new(f))
    }

    /// 固定间隔执行：下一次从本次完成时开始计时
    pub fn schedule_fixed_delay<F>(
        &self,
        initial_delay: Duration,
        delay: Duration,
        f: F,
    ) -> Result<ScheduledHandle>
    where
        F: FnMut(&LoopContext) + Send + 'static,
    {
        self.schedule_periodic(initial_delay, delay, PeriodMode::FixedDelay, Box::new(f))
    }

    fn schedule_periodic(
        &self,
        initial_delay: Duration,
        period: Duration,
        mode: PeriodMode,
        job: PeriodicJob,
    ) -> Result<ScheduledHandle> {
        if period.is_zero() {
            return Err(OrbitError::validation("周期必须大于 0"));
        }
        if initial_delay
            .checked_add(period)
            .and_then(|first_rearm| Instant::now().checked_add(first_rearm))
            .is_none()
        {
            return Err(OrbitError::validation(format!("周期过大: {:?}", period)));
        }

        let handle = ScheduledHandle::new();
        self.enqueue(
            initial_delay,
            Some(handle.clone()),
            Work::Periodic { job, period, mode },
        )?;
        Ok(handle)
    }

    /// 在本 Loop 线程上访问上下文
    ///
    /// # Panics
    ///
    /// 不在本 Loop 线程的任务中调用时 panic（ThreadAffinityViolation）。
    pub fn with_context<R>(&self, f: impl FnOnce(&LoopContext) -> R) -> R {
        match self.current_context() {
            Some(ctx) => f(&ctx),
            None => panic!(
                "ThreadAffinityViolation: Loop {} 的状态只能在其自身线程的任务中访问",
                self.id
            ),
        }
    }

    /// 是否拥有组件（仅限本线程）
    pub fn has_component<C: Component>(&self) -> bool {
        self.with_context(|ctx| ctx.components().has::<C>())
    }

    /// 获取组件（仅限本线程）
    pub fn get_component<C: Component>(&self) -> Option<Rc<C>> {
        self.with_context(|ctx| ctx.components().get::<C>())
    }

    /// 添加组件，返回被替换的旧组件（仅限本线程）
    pub fn add_component<C: Component>(&self, component: Rc<C>) -> Option<Rc<C>> {
        self.with_context(|ctx| ctx.components().add(component))
    }

    /// 移除组件（仅限本线程）
    pub fn remove_component<C: Component>(&self) -> Option<Rc<C>> {
        self.with_context(|ctx| ctx.components().remove::<C>())
    }

    /// 优雅关闭
    ///
    /// 拒绝新任务；已入队的任务和已到期的定时任务继续执行，
    /// 未到期的定时任务被丢弃，周期任务不再重新调度。
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if !state.shutdown {
            state.shutdown = true;
            info!(loop_id = %self.id, "Loop 开始关闭");
        }
        self.available.notify_all();
    }

    /// 立即关闭，返回尚未执行的一次性任务
    pub fn shutdown_now(&self) -> Vec<Runnable> {
        let entries = {
            let mut state = self.state.lock();
            state.shutdown = true;
            self.available.notify_all();
            state.queue.drain_ordered()
        };

        info!(loop_id = %self.id, pending = entries.len(), "Loop 立即关闭");
        entries
            .into_iter()
            .filter(|entry| !entry.is_cancelled())
            .filter_map(|entry| match entry.work {
                Work::Once(job) => Some(Runnable { job }),
                Work::Periodic { .. } => None,
            })
            .collect()
    }

    /// 等待线程退出，返回是否在超时前完成
    pub fn await_termination(&self, timeout: Duration) -> bool {
        if self.in_thread() {
            warn!(loop_id = %self.id, "不能在 Loop 自身线程上等待其终止");
            return self.is_terminated();
        }

        let deadline = Instant::now().checked_add(timeout);
        let mut terminated = self.terminated.lock();
        while !*terminated {
            match deadline {
                Some(deadline) => {
                    if self.termination.wait_until(&mut terminated, deadline).timed_out() {
                        return *terminated;
                    }
                }
                None => self.termination.wait(&mut terminated),
            }
        }
        true
    }

    /// 是否已关闭（不再接受新任务）
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    /// 线程是否已退出
    pub fn is_terminated(&self) -> bool {
        *self.terminated.lock()
    }

    /// 队列中的条目数（含未到期的定时任务）
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// 等待工作线程结束（不会等待自身）
    pub(crate) fn join(&self) {
        let handle = self.join_handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                error!(loop_id = %self.id, "Loop 线程异常退出");
            }
        }
    }

    fn rejected(&self) -> OrbitError {
        OrbitError::rejected("Loop 已关闭").with_context(ErrorContext::in_loop(self.id.as_str()))
    }

    fn current_context(&self) -> Option<Rc<LoopContext>> {
        if !self.in_thread() {
            return None;
        }
        CURRENT
            .try_with(|current| current.borrow().clone())
            .ok()
            .flatten()
            .filter(|ctx| ctx.loop_id() == self.id)
    }

    fn enqueue(
        &self,
        delay: Duration,
        handle: Option<ScheduledHandle>,
        work: Work,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.shutdown {
            drop(state);
            drop(work);
            return Err(self.rejected());
        }
        let Some(deadline) = Instant::now().checked_add(delay) else {
            drop(state);
            drop(work);
            return Err(OrbitError::validation(format!("延迟过大: {:?}", delay)));
        };
        state.queue.push(deadline, handle, work);
        self.available.notify_one();
        Ok(())
    }

    /// 执行用户任务并记录结果
    pub(crate) fn capture<T>(&self, f: impl FnOnce() -> T) -> Result<T> {
        let result = panic::catch_unwind(AssertUnwindSafe(f))
            .map_err(|payload| OrbitError::from_panic(payload.as_ref()));
        match &result {
            Ok(_) => self.metrics.task_completed(),
            Err(e) => {
                self.metrics.task_failed();
                warn!(loop_id = %self.id, error = %e, "任务执行失败");
            }
        }
        result
    }

    /// 标记执行中并隔离 panic
    fn guarded<T>(&self, f: impl FnOnce() -> T) -> Result<T> {
        let previous = self.executing.swap(true, Ordering::AcqRel);
        let result = panic::catch_unwind(AssertUnwindSafe(f))
            .map_err(|payload| OrbitError::from_panic(payload.as_ref()));
        self.executing.store(previous, Ordering::Release);
        result
    }

    fn run_worker(self: Arc<Self>, settings: LoopSettings) {
        let _ = self.thread_id.set(thread::current().id());
        let ctx = LoopContext::new(Arc::clone(&self), &settings);
        CURRENT.with(|current| *current.borrow_mut() = Some(Rc::clone(&ctx)));
        info!(loop_id = %self.id, "Loop 启动");

        for install in &settings.components {
            if let Err(e) = self.guarded(|| install(&ctx)) {
                error!(loop_id = %self.id, error = %e, "组件构造失败");
            }
        }
        match self.guarded(|| ctx.attach_components()) {
            Ok(bound) => debug!(loop_id = %self.id, bindings = bound, "Loop 组件已挂载"),
            Err(e) => error!(loop_id = %self.id, error = %e, "Loop 组件挂载失败"),
        }

        self.drive(&ctx);

        CURRENT.with(|current| current.borrow_mut().take());
        drop(ctx);

        *self.terminated.lock() = true;
        self.termination.notify_all();
        info!(loop_id = %self.id, "Loop 已终止");
    }

    fn drive(&self, ctx: &LoopContext) {
        loop {
            let entry = {
                let mut state = self.state.lock();
                loop {
                    if let Some(entry) = state.queue.pop_due(Instant::now()) {
                        break Some(entry);
                    }
                    if state.shutdown {
                        break None;
                    }
                    match state.queue.next_deadline() {
                        Some(deadline) => {
                            let _ = self.available.wait_until(&mut state, deadline);
                        }
                        None => self.available.wait(&mut state),
                    }
                }
            };

            match entry {
                Some(entry) => self.run_entry(ctx, entry),
                None => break,
            }
        }

        let leftovers = self.state.lock().queue.drain_ordered();
        if !leftovers.is_empty() {
            debug!(loop_id = %self.id, count = leftovers.len(), "丢弃未到期的定时任务");
        }
    }

    fn run_entry(&self, ctx: &LoopContext, entry: Entry) {
        if entry.is_cancelled() {
            return;
        }

        let Entry {
            deadline,
            handle,
            work,
            ..
        } = entry;

        match work {
            Work::Once(job) => {
                if let Err(e) = self.guarded(|| job(ctx)) {
                    error!(loop_id = %self.id, error = %e, "定时任务 panic");
                }
            }
            Work::Periodic {
                mut job,
                period,
                mode,
            } => {
                if let Err(e) = self.guarded(|| job(ctx)) {
                    error!(loop_id = %self.id, error = %e, "周期任务 panic，不再重新调度");
                    return;
                }

                let next = match mode {
                    PeriodMode::FixedRate => deadline.checked_add(period),
                    PeriodMode::FixedDelay => Instant::now().checked_add(period),
                };
                let Some(next) = next else {
                    error!(loop_id = %self.id, ?period, "下一次截止时间溢出，周期任务停止");
                    return;
                };
                let cancelled = handle.as_ref().is_some_and(ScheduledHandle::is_cancelled);

                let mut state = self.state.lock();
                if !state.shutdown && !cancelled {
                    state.queue.push(next, handle, Work::Periodic { job, period, mode });
                    return;
                }
                drop(state);
                debug!(loop_id = %self.id, "周期任务停止");
            }
        }
    }
}

impl fmt::Debug for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loop")
            .field("id", &self.id)
            .field("shutdown", &self.is_shutdown())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::{Bindable, Binder};
    use orbit_core::OrbitErrorKind;
    use std::sync::atomic::AtomicUsize;

    struct Marker;

    impl Bindable for Marker {
        fn bind(_binder: &mut Binder<Self>) {}
    }

    impl Component for Marker {}

    fn spawn(id: &str) -> Arc<Loop> {
        Loop::spawn(id, LoopSettings::default()).unwrap()
    }

    fn stop(lp: &Loop) {
        lp.shutdown();
        assert!(lp.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_submit_runs_on_loop_thread() {
        let lp = spawn("worker-a");
        let name = lp
            .submit(|ctx| {
                assert!(ctx.loop_handle().in_thread());
                thread::current().name().map(str::to_string)
            })
            .join()
            .unwrap();
        assert_eq!(name.as_deref(), Some("worker-a"));
        assert!(!lp.in_thread());
        stop(&lp);
    }

    #[test]
    fn test_inline_submit_resolves_immediately() {
        let lp = spawn("worker-inline");
        let inline_done = lp
            .submit(|ctx| {
                let mut inner = ctx.loop_handle().submit(|_| 41 + 1);
                let done = inner.is_done();
                (done, inner.try_take().and_then(|r| r.ok()))
            })
            .join()
            .unwrap();
        assert_eq!(inline_done, (true, Some(42)));
        stop(&lp);
    }

    #[test]
    fn test_panic_is_captured() {
        let lp = spawn("worker-panic");
        let result = lp.submit(|_| -> u32 { panic!("bad task") }).join();
        assert!(matches!(result, Err(OrbitError::TaskPanicked(ref msg)) if msg == "bad task"));

        // 线程依然存活
        assert_eq!(lp.submit(|_| 5).join().unwrap(), 5);
        assert_eq!(lp.metrics().tasks_failed(), 1);
        stop(&lp);
    }

    #[test]
    fn test_fifo_order() {
        let lp = spawn("worker-fifo");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..100 {
            let seen = Arc::clone(&seen);
            lp.execute(move |_| seen.lock().push(i)).unwrap();
        }
        lp.submit(|_| ()).join().unwrap();
        assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
        stop(&lp);
    }

    #[test]
    fn test_schedule_and_cancel() {
        let lp = spawn("worker-schedule");
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        lp.schedule(Duration::from_millis(20), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let counter = Arc::clone(&fired);
        let cancelled = lp
            .schedule(Duration::from_millis(20), move |_| {
                counter.fetch_add(100, Ordering::SeqCst);
            })
            .unwrap();
        assert!(cancelled.cancel());

        thread::sleep(Duration::from_millis(150));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        stop(&lp);
    }

    #[test]
    fn test_fixed_rate_until_cancel() {
        let lp = spawn("worker-rate");
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let handle = lp
            .schedule_fixed_rate(Duration::ZERO, Duration::from_millis(10), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        thread::sleep(Duration::from_millis(200));
        handle.cancel();
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 5, "只触发了 {} 次", seen);

        thread::sleep(Duration::from_millis(50));
        assert!(ticks.load(Ordering::SeqCst) <= seen + 1);
        stop(&lp);
    }

    #[test]
    fn test_zero_period_rejected() {
        let lp = spawn("worker-zero");
        let result = lp.schedule_fixed_delay(Duration::ZERO, Duration::ZERO, |_| {});
        assert!(matches!(result, Err(OrbitError::Validation(_))));
        stop(&lp);
    }

    #[test]
    fn test_unrepresentable_deadlines_rejected() {
        let lp = spawn("worker-huge");
        let huge = Duration::from_secs(u64::MAX / 2);
        let once = lp.schedule(huge, |_| {});
        let rate = lp.schedule_fixed_rate(Duration::ZERO, huge, |_| {});
        let delay = lp.schedule_fixed_delay(huge, Duration::from_millis(1), |_| {});
        assert!(matches!(once, Err(OrbitError::Validation(_))));
        assert!(matches!(rate, Err(OrbitError::Validation(_))));
        assert!(matches!(delay, Err(OrbitError::Validation(_))));

        assert_eq!(lp.submit(|_| 7).join().unwrap(), 7);
        assert_eq!(lp.queued(), 0);
        stop(&lp);
    }

    #[test]
    fn test_shutdown_rejects_new_work() {
        let lp = spawn("worker-shutdown");
        stop(&lp);
        assert!(lp.is_shutdown());
        assert!(lp.is_terminated());

        let err = lp.submit(|_| 1).join().unwrap_err();
        assert_eq!(err.kind(), OrbitErrorKind::Rejected);
        assert_eq!(err.to_string(), "任务被拒绝: Loop 已关闭 (loop: worker-shutdown)");
        assert!(lp.schedule(Duration::ZERO, |_| {}).is_err());
        assert_eq!(lp.metrics().tasks_rejected(), 1);
    }

    #[test]
    fn test_shutdown_stops_periodic_tasks() {
        let lp = spawn("worker-periodic-stop");
        lp.schedule_fixed_delay(Duration::ZERO, Duration::from_millis(5), |_| {})
            .unwrap();
        thread::sleep(Duration::from_millis(30));
        stop(&lp);
    }

    #[test]
    fn test_shutdown_now_returns_pending() {
        let lp = spawn("worker-now");
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let blocker = lp.submit(move |_| {
            let _ = release_rx.recv();
        });

        let queued: Vec<LoopFuture<i32>> = (0..3).map(|i| lp.submit(move |_| i)).collect();
        // 等阻塞任务开始执行
        while lp.queued() > 3 {
            thread::sleep(Duration::from_millis(1));
        }

        let pending = lp.shutdown_now();
        assert_eq!(pending.len(), 3);
        drop(pending);
        release_tx.send(()).unwrap();

        assert!(blocker.join().is_ok());
        for fut in queued {
            assert!(matches!(fut.join(), Err(OrbitError::Cancelled)));
        }
        assert!(lp.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_resubmit_moves_pending_work() {
        let from = spawn("worker-from");
        let to = spawn("worker-to");
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let blocker = from.submit(move |_| {
            let _ = release_rx.recv();
        });
        let queued: Vec<LoopFuture<String>> = (0..2)
            .map(|i| from.submit(move |ctx| format!("{}:{}", ctx.loop_id(), i)))
            .collect();
        while from.queued() > 2 {
            thread::sleep(Duration::from_millis(1));
        }

        for task in from.shutdown_now() {
            to.resubmit(task).unwrap();
        }
        release_tx.send(()).unwrap();

        assert!(blocker.join().is_ok());
        let results: Vec<String> = queued.into_iter().map(|f| f.join().unwrap()).collect();
        assert_eq!(results, vec!["worker-to:0", "worker-to:1"]);
        assert!(from.await_termination(Duration::from_secs(5)));

        stop(&to);
        let (orphan_tx, orphan_rx) = std::sync::mpsc::channel::<()>();
        let late = spawn("worker-late");
        let hold = late.submit(move |_| {
            let _ = orphan_rx.recv();
        });
        let orphan = late.submit(|_| 0);
        while late.queued() > 1 {
            thread::sleep(Duration::from_millis(1));
        }
        let leftovers = late.shutdown_now();
        orphan_tx.send(()).unwrap();
        for task in leftovers {
            assert!(to.resubmit(task).is_err());
        }
        assert!(hold.join().is_ok());
        assert!(matches!(orphan.join(), Err(OrbitError::Cancelled)));
        assert!(late.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_component_access_on_loop_thread() {
        let lp = spawn("worker-components");
        let found = lp
            .submit(|ctx| {
                let lp = ctx.loop_handle();
                assert!(lp.add_component(Rc::new(Marker)).is_none());
                lp.has_component::<Marker>() && lp.get_component::<Marker>().is_some()
            })
            .join()
            .unwrap();
        assert!(found);
        stop(&lp);
    }

    #[test]
    #[should_panic(expected = "ThreadAffinityViolation")]
    fn test_component_access_off_thread_panics() {
        let lp = spawn("worker-affinity");
        lp.has_component::<Marker>();
    }

    #[test]
    fn test_installers_run_first() {
        let settings = LoopSettings {
            components: vec![Arc::new(|ctx: &LoopContext| {
                ctx.components().add(Rc::new(Marker));
            })],
            ..Default::default()
        };
        let lp = Loop::spawn("worker-installed", settings).unwrap();
        assert!(lp.submit(|ctx| ctx.components().has::<Marker>()).join().unwrap());
        stop(&lp);
    }
}

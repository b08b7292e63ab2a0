//! cron 调度器
//!
//! 每个表达式一个作业，作业上挂着该表达式的全部绑定。
//! 状态：无 → 已布置 → 触发 → 重新布置 → … → 无。最后一个绑定被移除时
//! 作业连同待触发的定时任务一起删除。

use crate::bind::{ObjectKey, Subscriber, TimedInvoke, invoke_guarded};
use crate::context::LoopContext;
use crate::executor::ScheduledHandle;
use orbit_core::time::NEVER;
use orbit_core::{CronEvaluator, OrbitError, Result, TriggerHistory, now_millis};
use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Clone)]
struct CronBinding {
    subscriber: ObjectKey,
    owner: Option<Rc<str>>,
    method: &'static str,
    invoke: TimedInvoke,
}

impl CronBinding {
    fn matches(&self, subscriber: ObjectKey, method: &str) -> bool {
        self.subscriber == subscriber && self.method == method
    }
}

struct CronJob {
    /// 区分同一表达式先后创建的作业
    id: u64,
    history: TriggerHistory,
    last_fire: i64,
    next_fire: i64,
    bindings: Vec<CronBinding>,
    pending: Option<ScheduledHandle>,
}

/// Loop 内 cron 调度器
pub struct Scheduler {
    ctx: Weak<LoopContext>,
    evaluator: Arc<dyn CronEvaluator>,
    jobs: RefCell<HashMap<String, CronJob>>,
    next_id: Cell<u64>,
}

impl Scheduler {
    pub(crate) fn new(ctx: Weak<LoopContext>, evaluator: Arc<dyn CronEvaluator>) -> Self {
        Self {
            ctx,
            evaluator,
            jobs: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }

    /// 把定时方法绑定到 cron 表达式
    ///
    /// `cron` 为 `None` 时使用方法声明的第一个表达式。方法未声明、
    /// 已绑定到该表达式、Loop 已关闭或表达式无法求值时返回 false。
    pub fn register(&self, subscriber: &Subscriber, method: &str, cron: Option<&str>) -> bool {
        let Some(ctx) = self.ctx.upgrade() else {
            return false;
        };
        if ctx.loop_handle().is_shutdown() {
            warn!(loop_id = %ctx.loop_id(), method, "Loop 已关闭，拒绝注册 cron");
            return false;
        }

        let Some(decl) = subscriber.resolve().timed(method) else {
            warn!(
                subscriber = subscriber.type_name(),
                method, "未声明的定时方法"
            );
            return false;
        };

        let expression = match cron.or_else(|| decl.crons.first().map(String::as_str)) {
            Some(expression) => expression.to_string(),
            None => {
                warn!(
                    subscriber = subscriber.type_name(),
                    method, "没有可用的 cron 表达式"
                );
                return false;
            }
        };

        let binding = CronBinding {
            subscriber: subscriber.key(),
            owner: subscriber.owner_rc(),
            method: decl.method,
            invoke: decl.invoke,
        };
        self.bind(&ctx, expression, binding)
    }

    /// 注册订阅者声明的全部 cron 触发器，返回成功的个数
    pub fn register_all(&self, subscriber: &Subscriber) -> usize {
        let Some(ctx) = self.ctx.upgrade() else {
            return 0;
        };
        if ctx.loop_handle().is_shutdown() {
            return 0;
        }

        let mut added = 0;
        for decl in subscriber.resolve().timed {
            for expression in &decl.crons {
                let binding = CronBinding {
                    subscriber: subscriber.key(),
                    owner: subscriber.owner_rc(),
                    method: decl.method,
                    invoke: Rc::clone(&decl.invoke),
                };
                if self.bind(&ctx, expression.clone(), binding) {
                    added += 1;
                }
            }
        }
        added
    }

    fn bind(&self, ctx: &LoopContext, expression: String, binding: CronBinding) -> bool {
        let mut jobs = self.jobs.borrow_mut();

        if let Some(job) = jobs.get_mut(&expression) {
            if job
                .bindings
                .iter()
                .any(|b| b.matches(binding.subscriber, binding.method))
            {
                warn!(method = binding.method, cron = %expression, "cron 绑定已存在");
                return false;
            }
            job.bindings.push(binding);
            return true;
        }

        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let mut job = CronJob {
            id,
            history: TriggerHistory::default(),
            last_fire: NEVER,
            next_fire: NEVER,
            bindings: vec![binding],
            pending: None,
        };

        match self.arm(ctx, &expression, &mut job) {
            Ok(()) => {
                debug!(loop_id = %ctx.loop_id(), cron = %expression, next = job.next_fire, "cron 作业已布置");
                jobs.insert(expression, job);
                true
            }
            Err(e) => {
                warn!(cron = %expression, error = %e, "cron 作业布置失败");
                false
            }
        }
    }

    /// 计算下一次触发并挂到 Loop 上
    fn arm(&self, ctx: &LoopContext, expression: &str, job: &mut CronJob) -> Result<()> {
        let next = self
            .evaluator
            .next_fire_time(expression, &job.history)
            .and_then(|next| next.ok_or_else(|| OrbitError::scheduling("没有下一次触发时间")))
            .map_err(|e| e.with_context(("cron", expression)))?;

        let delay = u64::try_from(next - now_millis()).unwrap_or(0);
        let key = expression.to_string();
        let id = job.id;
        let handle = ctx
            .loop_handle()
            .schedule(Duration::from_millis(delay), move |ctx| ctx.scheduler().fire(&key, id))?;

        job.next_fire = next;
        job.pending = Some(handle);
        Ok(())
    }

    pub(crate) fn fire(&self, expression: &str, id: u64) {
        let Some(ctx) = self.ctx.upgrade() else {
            return;
        };
        let ctx: &LoopContext = &ctx;

        let (bindings, prev, scheduled) = {
            let mut jobs = self.jobs.borrow_mut();
            let Some(job) = jobs.get_mut(expression).filter(|job| job.id == id) else {
                return;
            };
            job.pending = None;
            (job.bindings.clone(), job.last_fire, job.next_fire)
        };

        let now = now_millis();
        ctx.loop_handle().metrics().record_cron_fired();
        for binding in &bindings {
            // 同一次触发中可能已被前面的处理器注销
            if !self.contains(expression, id, binding) {
                continue;
            }
            invoke_guarded(ctx, binding.owner.as_deref(), binding.method, || {
                (binding.invoke)(ctx, now, prev)
            });
        }
        let completion = now_millis();
        ctx.loop_handle().metrics_sink().record_timer(
            "cron.fire",
            ctx.loop_id(),
            Duration::from_millis(u64::try_from(completion - now).unwrap_or(0)),
        );

        let mut jobs = self.jobs.borrow_mut();
        let Some(job) = jobs.get_mut(expression).filter(|job| job.id == id) else {
            return;
        };
        job.history.record(scheduled, now, completion);
        job.last_fire = now;

        if ctx.loop_handle().is_shutdown() {
            debug!(loop_id = %ctx.loop_id(), cron = %expression, "Loop 已关闭，cron 作业不再布置");
            return;
        }

        if let Err(e) = self.arm(ctx, expression, job) {
            if let Some(job) = jobs.remove(expression) {
                error!(
                    loop_id = %ctx.loop_id(),
                    cron = %expression,
                    bindings = job.bindings.len(),
                    error = %e,
                    "cron 作业无法继续，已注销全部绑定"
                );
            }
        }
    }

    fn contains(&self, expression: &str, id: u64, binding: &CronBinding) -> bool {
        self.jobs
            .borrow()
            .get(expression)
            .filter(|job| job.id == id)
            .is_some_and(|job| {
                job.bindings
                    .iter()
                    .any(|b| b.matches(binding.subscriber, binding.method))
            })
    }

    /// 注销订阅者的 cron 绑定，`method` 为 `None` 时注销全部
    pub fn unregister(&self, subscriber: &Subscriber, method: Option<&str>) -> usize {
        let key = subscriber.key();
        self.remove_where(|b| b.subscriber == key && method.is_none_or(|m| b.method == m))
    }

    /// 注销类型 `T` 所有实例的某个方法
    pub fn unregister_type<T: 'static>(&self, method: &str) -> usize {
        let type_id = TypeId::of::<T>();
        self.remove_where(|b| b.subscriber.type_id() == type_id && b.method == method)
    }

    fn remove_where(&self, predicate: impl Fn(&CronBinding) -> bool) -> usize {
        let mut removed = 0;
        let mut emptied = Vec::new();
        {
            let mut jobs = self.jobs.borrow_mut();
            for (expression, job) in jobs.iter_mut() {
                let before = job.bindings.len();
                job.bindings.retain(|b| !predicate(b));
                removed += before - job.bindings.len();
                if job.bindings.is_empty() {
                    emptied.push(expression.clone());
                }
            }
            for expression in emptied {
                if let Some(job) = jobs.remove(&expression) {
                    if let Some(pending) = job.pending {
                        pending.cancel();
                    }
                    debug!(cron = %expression, "cron 作业已删除");
                }
            }
        }
        removed
    }

    /// 是否已绑定；`cron` 为 `None` 时匹配任意表达式
    pub fn is_registered(&self, subscriber: &Subscriber, method: &str, cron: Option<&str>) -> bool {
        let key = subscriber.key();
        self.jobs.borrow().iter().any(|(expression, job)| {
            cron.is_none_or(|c| c == expression)
                && job.bindings.iter().any(|b| b.matches(key, method))
        })
    }

    /// 作业数（即不同表达式的个数）
    pub fn job_count(&self) -> usize {
        self.jobs.borrow().len()
    }

    /// 表达式上的绑定数
    pub fn binding_count(&self, cron: &str) -> usize {
        self.jobs
            .borrow()
            .get(cron)
            .map_or(0, |job| job.bindings.len())
    }

    /// 表达式下一次触发时间（Unix 毫秒）
    pub fn next_fire_time(&self, cron: &str) -> Option<i64> {
        self.jobs.borrow().get(cron).map(|job| job.next_fire)
    }
}

//! tick 管理器

use crate::bind::{ObjectKey, Subscriber, TimedInvoke, invoke_guarded};
use crate::context::LoopContext;
use crate::executor::ScheduledHandle;
use orbit_core::time::NEVER;
use orbit_core::{TimeUnit, now_millis};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

type TickKey = (ObjectKey, &'static str);

struct TickJob {
    owner: Option<Rc<str>>,
    delay: i64,
    period: i64,
    unit: TimeUnit,
    fixed_delay: bool,
    last_tick: i64,
    handle: ScheduledHandle,
    invoke: TimedInvoke,
}

/// Loop 内周期触发管理
///
/// 每个 (对象, 方法) 至多一个作业。
pub struct TickManager {
    ctx: Weak<LoopContext>,
    jobs: RefCell<HashMap<TickKey, TickJob>>,
}

impl TickManager {
    pub(crate) fn new(ctx: Weak<LoopContext>) -> Self {
        Self {
            ctx,
            jobs: RefCell::new(HashMap::new()),
        }
    }

    /// 注册周期触发
    ///
    /// `fixed_delay` 为 true 时下一次从本次完成开始计时，否则按固定频率。
    pub fn register(
        &self,
        subscriber: &Subscriber,
        method: &str,
        delay: i64,
        period: i64,
        unit: TimeUnit,
        fixed_delay: bool,
    ) -> bool {
        let Some(ctx) = self.ctx.upgrade() else {
            return false;
        };
        let lp = ctx.loop_handle();
        if lp.is_shutdown() {
            warn!(loop_id = %lp.id(), method, "Loop 已关闭，拒绝注册 tick");
            return false;
        }
        if delay < 0 || period <= 0 {
            warn!(method, delay, period, "tick 参数无效");
            return false;
        }

        let Some(decl) = subscriber.resolve().timed(method) else {
            warn!(
                subscriber = subscriber.type_name(),
                method, "未声明的定时方法"
            );
            return false;
        };

        let key = (subscriber.key(), decl.method);
        if self.jobs.borrow().contains_key(&key) {
            warn!(subscriber = subscriber.type_name(), method, "tick 已注册");
            return false;
        }

        // 参数已校验非负
        let initial = unit.to_duration(delay as u64);
        let every = unit.to_duration(period as u64);
        let fire = move |ctx: &LoopContext| ctx.tick_manager().fire(key);
        let scheduled = if fixed_delay {
            lp.schedule_fixed_delay(initial, every, fire)
        } else {
            lp.schedule_fixed_rate(initial, every, fire)
        };

        let handle = match scheduled {
            Ok(handle) => handle,
            Err(e) => {
                warn!(method, error = %e, "tick 布置失败");
                return false;
            }
        };

        self.jobs.borrow_mut().insert(
            key,
            TickJob {
                owner: subscriber.owner_rc(),
                delay,
                period,
                unit,
                fixed_delay,
                last_tick: NEVER,
                handle,
                invoke: decl.invoke,
            },
        );
        debug!(loop_id = %lp.id(), method, period, ?unit, fixed_delay, "tick 已注册");
        true
    }

    /// 注册订阅者声明的全部 tick 触发器，返回成功的个数
    pub fn register_all(&self, subscriber: &Subscriber) -> usize {
        subscriber
            .resolve()
            .timed
            .iter()
            .filter_map(|decl| decl.tick.map(|spec| (decl.method, spec)))
            .filter(|(method, spec)| {
                self.register(
                    subscriber,
                    method,
                    spec.delay,
                    spec.period,
                    spec.unit,
                    spec.fixed_delay,
                )
            })
            .count()
    }

    fn fire(&self, key: TickKey) {
        let Some(ctx) = self.ctx.upgrade() else {
            return;
        };
        let ctx: &LoopContext = &ctx;

        let (invoke, owner, prev) = {
            let jobs = self.jobs.borrow();
            let Some(job) = jobs.get(&key) else {
                return;
            };
            (Rc::clone(&job.invoke), job.owner.clone(), job.last_tick)
        };

        let now = now_millis();
        ctx.loop_handle().metrics().record_tick_fired();
        invoke_guarded(ctx, owner.as_deref(), key.1, || invoke(ctx, now, prev));

        if let Some(job) = self.jobs.borrow_mut().get_mut(&key) {
            job.last_tick = now;
        }
    }

    /// 注销 tick，`method` 为 `None` 时注销该对象的全部 tick
    pub fn unregister(&self, subscriber: &Subscriber, method: Option<&str>) -> usize {
        let object = subscriber.key();
        let mut removed = 0;
        self.jobs.borrow_mut().retain(|(key, name), job| {
            if *key == object && method.is_none_or(|m| m == *name) {
                job.handle.cancel();
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn is_registered(&self, subscriber: &Subscriber, method: &str) -> bool {
        let object = subscriber.key();
        self.jobs
            .borrow()
            .keys()
            .any(|(key, name)| *key == object && *name == method)
    }

    /// 上一次触发时间，尚未触发为 -1
    pub fn last_tick(&self, subscriber: &Subscriber, method: &str) -> Option<i64> {
        let object = subscriber.key();
        self.jobs
            .borrow()
            .iter()
            .find(|((key, name), _)| *key == object && *name == method)
            .map(|(_, job)| job.last_tick)
    }

    /// 作业的 (delay, period, unit, fixed_delay)
    pub fn schedule_of(&self, subscriber: &Subscriber, method: &str) -> Option<(i64, i64, TimeUnit, bool)> {
        let object = subscriber.key();
        self.jobs
            .borrow()
            .iter()
            .find(|((key, name), _)| *key == object && *name == method)
            .map(|(_, job)| (job.delay, job.period, job.unit, job.fixed_delay))
    }

    pub fn job_count(&self) -> usize {
        self.jobs.borrow().len()
    }
}

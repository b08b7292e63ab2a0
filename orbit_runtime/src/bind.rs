//! 处理器声明
//!
//! 类型通过实现 [`Bindable`] 静态声明自己的事件处理器、cron 触发器和 tick 触发器。
//! 注册时 [`Subscriber`] 把声明解析成与具体实例绑定的闭包，交给
//! EventBus / Scheduler / TickManager。
//!
//! ```rust,ignore
//! struct Player { id: String, components: Components }
//!
//! impl Bindable for Player {
//!     fn bind(binder: &mut Binder<Self>) {
//!         binder
//!             .on::<LevelUp>("on_level_up", |player, ctx, event| player.level_up(ctx, event))
//!             .cron("save", "0 */5 * * * *", |player, _ctx, _now, _prev| player.save())
//!             .tick("regen", TickSpec::every(1, TimeUnit::Seconds), |player, _ctx, now, prev| {
//!                 player.regen(now, prev)
//!             });
//!     }
//! }
//! ```

use crate::context::LoopContext;
use crate::event::Event;
use orbit_core::TimeUnit;
use orbit_core::error::panic_message;
use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use tracing::error;

/// 处理器返回值
pub type HandlerResult = anyhow::Result<()>;

/// 声明处理器的类型
pub trait Bindable: Sized + 'static {
    /// 声明本类型的处理器
    fn bind(binder: &mut Binder<Self>);
}

/// tick 触发参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSpec {
    /// 首次触发前的延迟
    pub delay: i64,
    /// 周期
    pub period: i64,
    /// `delay` 与 `period` 的单位
    pub unit: TimeUnit,
    /// true 为固定间隔，false 为固定频率
    pub fixed_delay: bool,
}

impl TickSpec {
    /// 固定频率、无初始延迟
    pub fn every(period: i64, unit: TimeUnit) -> Self {
        Self {
            delay: 0,
            period,
            unit,
            fixed_delay: false,
        }
    }

    /// 设置初始延迟
    pub fn with_delay(mut self, delay: i64) -> Self {
        self.delay = delay;
        self
    }

    /// 改为固定间隔
    pub fn fixed_delay(mut self) -> Self {
        self.fixed_delay = true;
        self
    }
}

type EventFn<T> = Rc<dyn Fn(&T, &LoopContext, &dyn Any) -> HandlerResult>;
type TimedFn<T> = Rc<dyn Fn(&T, &LoopContext, i64, i64) -> HandlerResult>;

/// 与实例绑定后的事件处理器
pub(crate) type EventInvoke = Rc<dyn Fn(&LoopContext, &dyn Any) -> HandlerResult>;
/// 与实例绑定后的定时处理器，参数为 (now, prev)
pub(crate) type TimedInvoke = Rc<dyn Fn(&LoopContext, i64, i64) -> HandlerResult>;

struct EventDecl<T> {
    event_type: TypeId,
    event_name: &'static str,
    param: Option<(TypeId, &'static str)>,
    method: &'static str,
    priority: i32,
    handler: EventFn<T>,
}

struct TimedDecl<T> {
    method: &'static str,
    crons: Vec<String>,
    tick: Option<TickSpec>,
    handler: TimedFn<T>,
}

/// 处理器声明收集器
pub struct Binder<T> {
    events: Vec<EventDecl<T>>,
    timed: Vec<TimedDecl<T>>,
}

impl<T: Bindable> Binder<T> {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            timed: Vec::new(),
        }
    }

    /// 订阅事件（优先级 0）
    pub fn on<E: Event>(
        &mut self,
        method: &'static str,
        handler: impl Fn(&T, &LoopContext, &E) -> HandlerResult + 'static,
    ) -> &mut Self {
        self.push_event(method, 0, None, handler)
    }

    /// 订阅事件，优先级高的先执行
    pub fn on_with_priority<E: Event>(
        &mut self,
        method: &'static str,
        priority: i32,
        handler: impl Fn(&T, &LoopContext, &E) -> HandlerResult + 'static,
    ) -> &mut Self {
        self.push_event(method, priority, None, handler)
    }

    /// 订阅带泛型参数的事件
    ///
    /// 绑定上会记录参数类型 `P`，事件可在 [`Event::accept`] 中据此过滤。
    pub fn on_param<E: Event, P: 'static>(
        &mut self,
        method: &'static str,
        handler: impl Fn(&T, &LoopContext, &E) -> HandlerResult + 'static,
    ) -> &mut Self {
        self.push_event(method, 0, Some((TypeId::of::<P>(), type_name::<P>())), handler)
    }

    fn push_event<E, F>(
        &mut self,
        method: &'static str,
        priority: i32,
        param: Option<(TypeId, &'static str)>,
        handler: F,
    ) -> &mut Self
    where
        E: Event,
        F: Fn(&T, &LoopContext, &E) -> HandlerResult + 'static,
    {
        let handler: EventFn<T> = Rc::new(move |target: &T, ctx: &LoopContext, event: &dyn Any| {
            match event.downcast_ref::<E>() {
                Some(event) => handler(target, ctx, event),
                None => Ok(()),
            }
        });
        self.events.push(EventDecl {
            event_type: TypeId::of::<E>(),
            event_name: type_name::<E>(),
            param,
            method,
            priority,
            handler,
        });
        self
    }

    /// 声明 cron 触发器
    ///
    /// 同一方法可以多次声明，每个表达式各自触发；处理器以第一次声明为准。
    pub fn cron<F>(&mut self, method: &'static str, expression: &str, handler: F) -> &mut Self
    where
        F: Fn(&T, &LoopContext, i64, i64) -> HandlerResult + 'static,
    {
        self.timed_entry(method, handler).crons.push(expression.to_string());
        self
    }

    /// 声明 tick 触发器
    pub fn tick<F>(&mut self, method: &'static str, spec: TickSpec, handler: F) -> &mut Self
    where
        F: Fn(&T, &LoopContext, i64, i64) -> HandlerResult + 'static,
    {
        self.timed_entry(method, handler).tick = Some(spec);
        self
    }

    /// 声明只能显式注册的定时方法
    pub fn timed<F>(&mut self, method: &'static str, handler: F) -> &mut Self
    where
        F: Fn(&T, &LoopContext, i64, i64) -> HandlerResult + 'static,
    {
        self.timed_entry(method, handler);
        self
    }

    fn timed_entry<F>(&mut self, method: &'static str, handler: F) -> &mut TimedDecl<T>
    where
        F: Fn(&T, &LoopContext, i64, i64) -> HandlerResult + 'static,
    {
        let index = match self.timed.iter().position(|decl| decl.method == method) {
            Some(index) => index,
            None => {
                self.timed.push(TimedDecl {
                    method,
                    crons: Vec::new(),
                    tick: None,
                    handler: Rc::new(handler),
                });
                self.timed.len() - 1
            }
        };
        &mut self.timed[index]
    }

    fn into_resolved(self, target: Rc<T>) -> Resolved {
        let events = self
            .events
            .into_iter()
            .map(|decl| {
                let target = Rc::clone(&target);
                let handler = decl.handler;
                ResolvedEvent {
                    event_type: decl.event_type,
                    event_name: decl.event_name,
                    param: decl.param,
                    method: decl.method,
                    priority: decl.priority,
                    invoke: Rc::new(move |ctx: &LoopContext, event: &dyn Any| {
                        handler(&*target, ctx, event)
                    }),
                }
            })
            .collect();

        let timed = self
            .timed
            .into_iter()
            .map(|decl| {
                let target = Rc::clone(&target);
                let handler = decl.handler;
                ResolvedTimed {
                    method: decl.method,
                    crons: decl.crons,
                    tick: decl.tick,
                    invoke: Rc::new(move |ctx: &LoopContext, now: i64, prev: i64| {
                        handler(&*target, ctx, now, prev)
                    }),
                }
            })
            .collect();

        Resolved { events, timed }
    }
}

pub(crate) struct ResolvedEvent {
    pub event_type: TypeId,
    pub event_name: &'static str,
    pub param: Option<(TypeId, &'static str)>,
    pub method: &'static str,
    pub priority: i32,
    pub invoke: EventInvoke,
}

pub(crate) struct ResolvedTimed {
    pub method: &'static str,
    pub crons: Vec<String>,
    pub tick: Option<TickSpec>,
    pub invoke: TimedInvoke,
}

#[derive(Default)]
pub(crate) struct Resolved {
    pub events: Vec<ResolvedEvent>,
    pub timed: Vec<ResolvedTimed>,
}

impl Resolved {
    pub fn timed(self, method: &str) -> Option<ResolvedTimed> {
        self.timed.into_iter().find(|decl| decl.method == method)
    }
}

/// 对象身份：实例地址 + 具体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    addr: usize,
    type_id: TypeId,
}

impl ObjectKey {
    /// 具体类型
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
}

/// 类型擦除后的订阅者
///
/// 只是实例的一个句柄，克隆不复制实例。
#[derive(Clone)]
pub struct Subscriber {
    key: ObjectKey,
    type_name: &'static str,
    object: Rc<dyn Any>,
    owner: Option<Rc<str>>,
    resolve: fn(&Rc<dyn Any>) -> Resolved,
}

impl Subscriber {
    /// 包装一个实例
    pub fn new<T: Bindable>(object: Rc<T>) -> Self {
        let object: Rc<dyn Any> = object;
        Self {
            key: ObjectKey {
                addr: Rc::as_ptr(&object) as *const () as usize,
                type_id: TypeId::of::<T>(),
            },
            type_name: type_name::<T>(),
            object,
            owner: None,
            resolve: resolve_for::<T>,
        }
    }

    /// 指定所属实体
    pub fn with_owner(mut self, owner: impl Into<Rc<str>>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// 对象身份
    pub fn key(&self) -> ObjectKey {
        self.key
    }

    /// 具体类型名
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 所属实体 ID
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub(crate) fn owner_rc(&self) -> Option<Rc<str>> {
        self.owner.clone()
    }

    /// 是否为类型 `T` 的实例
    pub fn is<T: 'static>(&self) -> bool {
        self.key.type_id == TypeId::of::<T>()
    }

    /// 取回具体类型
    pub fn downcast<T: 'static>(&self) -> Option<Rc<T>> {
        Rc::clone(&self.object).downcast::<T>().ok()
    }

    pub(crate) fn resolve(&self) -> Resolved {
        (self.resolve)(&self.object)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("type", &self.type_name)
            .field("owner", &self.owner)
            .finish()
    }
}

fn resolve_for<T: Bindable>(object: &Rc<dyn Any>) -> Resolved {
    let Ok(target) = Rc::clone(object).downcast::<T>() else {
        return Resolved::default();
    };
    let mut binder = Binder::new();
    T::bind(&mut binder);
    binder.into_resolved(target)
}

/// 调用处理器，隔离错误和 panic
///
/// 在带 loop / entity 字段的 span 中执行，返回是否成功。
pub(crate) fn invoke_guarded(
    ctx: &LoopContext,
    entity: Option<&str>,
    handler: &str,
    f: impl FnOnce() -> HandlerResult,
) -> bool {
    let span = tracing::debug_span!(
        "handler",
        loop_id = %ctx.loop_id(),
        entity = entity.unwrap_or("-"),
        handler
    );
    let _enter = span.enter();

    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!(error = %format!("{e:#}"), "处理器执行失败");
            false
        }
        Err(payload) => {
            error!(panic = %panic_message(payload.as_ref()), "处理器 panic");
            false
        }
    }
}

//! 事件总线
//!
//! 绑定按事件的具体类型分组，组内按优先级降序、注册顺序升序排列。
//! 派发在快照上进行：派发过程中新增的绑定从下一次派发开始生效，
//! 被注销的绑定立即跳过。

use super::{Event, EventBinding};
use crate::bind::{Subscriber, invoke_guarded};
use crate::context::LoopContext;
use std::any::{TypeId, type_name};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Instant;
use tracing::{debug, warn};

/// Loop 内事件总线
pub struct EventBus {
    ctx: Weak<LoopContext>,
    bindings: RefCell<HashMap<TypeId, Vec<Rc<EventBinding>>>>,
    /// 正在派发的事件类型栈
    dispatching: RefCell<Vec<&'static str>>,
    max_depth: usize,
    seq: Cell<u64>,
}

impl EventBus {
    pub(crate) fn new(ctx: Weak<LoopContext>, max_depth: usize) -> Self {
        Self {
            ctx,
            bindings: RefCell::new(HashMap::new()),
            dispatching: RefCell::new(Vec::new()),
            max_depth,
            seq: Cell::new(0),
        }
    }

    /// 注册订阅者的全部事件处理器，返回新增的绑定数
    ///
    /// 已存在的 (订阅者, 处理器) 绑定不会重复添加。
    pub fn register(&self, subscriber: &Subscriber) -> usize {
        let resolved = subscriber.resolve();
        let key = subscriber.key();
        let mut bindings = self.bindings.borrow_mut();
        let mut added = 0;

        for decl in resolved.events {
            let list = bindings.entry(decl.event_type).or_default();
            if list.iter().any(|binding| binding.matches(key, decl.method)) {
                debug!(
                    subscriber = subscriber.type_name(),
                    method = decl.method,
                    "事件处理器已注册，忽略"
                );
                continue;
            }

            let seq = self.seq.get();
            self.seq.set(seq + 1);
            list.push(Rc::new(EventBinding::new(subscriber, decl, seq)));
            list.sort_by(|a, b| b.priority().cmp(&a.priority()).then(a.seq().cmp(&b.seq())));
            added += 1;
        }

        added
    }

    /// 注销订阅者的全部事件处理器，返回移除的绑定数
    pub fn unregister(&self, subscriber: &Subscriber) -> usize {
        let key = subscriber.key();
        let mut bindings = self.bindings.borrow_mut();
        let mut removed = 0;

        bindings.retain(|_, list| {
            list.retain(|binding| {
                if binding.subscriber() == key {
                    binding.deactivate();
                    removed += 1;
                    false
                } else {
                    true
                }
            });
            !list.is_empty()
        });

        removed
    }

    /// 派发事件，返回成功执行的处理器数
    ///
    /// 嵌套派发超过上限时拒绝并返回 0。
    pub fn post<E: Event>(&self, event: E) -> usize {
        let snapshot = match self.bindings.borrow().get(&TypeId::of::<E>()) {
            Some(list) if !list.is_empty() => list.clone(),
            _ => return 0,
        };
        let Some(ctx) = self.ctx.upgrade() else {
            return 0;
        };
        let lp = ctx.loop_handle();

        {
            let mut stack = self.dispatching.borrow_mut();
            if stack.len() >= self.max_depth {
                lp.metrics().event_refused();
                warn!(
                    loop_id = %lp.id(),
                    event = type_name::<E>(),
                    depth = stack.len(),
                    stack = ?*stack,
                    "事件嵌套过深，拒绝派发"
                );
                return 0;
            }
            stack.push(type_name::<E>());
        }
        let _frame = DispatchFrame(&self.dispatching);

        lp.metrics().event_dispatched();
        let started = Instant::now();
        let mut succeeded = 0;
        for binding in &snapshot {
            if !binding.is_active() || !event.accept(binding) {
                continue;
            }
            if invoke_guarded(&ctx, binding.owner(), binding.method(), || {
                binding.invoke(&ctx, &event)
            }) {
                succeeded += 1;
            }
        }
        lp.metrics_sink()
            .record_timer("event.dispatch", lp.id(), started.elapsed());

        succeeded
    }

    /// 事件类型 `E` 是否有绑定
    pub fn has_subscribers<E: Event>(&self) -> bool {
        self.bindings
            .borrow()
            .get(&TypeId::of::<E>())
            .is_some_and(|list| !list.is_empty())
    }

    /// 事件类型 `E` 的绑定快照，按派发顺序
    pub fn bindings_of<E: Event>(&self) -> Vec<Rc<EventBinding>> {
        self.bindings
            .borrow()
            .get(&TypeId::of::<E>())
            .cloned()
            .unwrap_or_default()
    }

    /// 绑定总数
    pub fn binding_count(&self) -> usize {
        self.bindings.borrow().values().map(Vec::len).sum()
    }

    /// 当前嵌套深度
    pub fn depth(&self) -> usize {
        self.dispatching.borrow().len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// 离开派发时出栈
struct DispatchFrame<'a>(&'a RefCell<Vec<&'static str>>);

impl Drop for DispatchFrame<'_> {
    fn drop(&mut self) {
        self.0.borrow_mut().pop();
    }
}

//! 事件绑定

use crate::bind::{EventInvoke, HandlerResult, ObjectKey, ResolvedEvent, Subscriber};
use crate::context::LoopContext;
use std::any::{Any, TypeId};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// (订阅者, 处理器) 在某个事件类型下的绑定
pub struct EventBinding {
    subscriber: ObjectKey,
    subscriber_type: &'static str,
    owner: Option<Rc<str>>,
    event_name: &'static str,
    param: Option<(TypeId, &'static str)>,
    method: &'static str,
    priority: i32,
    seq: u64,
    active: Cell<bool>,
    invoke: EventInvoke,
}

impl EventBinding {
    pub(crate) fn new(subscriber: &Subscriber, decl: ResolvedEvent, seq: u64) -> Self {
        Self {
            subscriber: subscriber.key(),
            subscriber_type: subscriber.type_name(),
            owner: subscriber.owner_rc(),
            event_name: decl.event_name,
            param: decl.param,
            method: decl.method,
            priority: decl.priority,
            seq,
            active: Cell::new(true),
            invoke: decl.invoke,
        }
    }

    /// 订阅者身份
    pub fn subscriber(&self) -> ObjectKey {
        self.subscriber
    }

    /// 订阅者类型名
    pub fn subscriber_type(&self) -> &'static str {
        self.subscriber_type
    }

    /// 所属实体 ID
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// 事件类型名
    pub fn event_name(&self) -> &'static str {
        self.event_name
    }

    /// 处理器名
    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// 注册序号，同优先级按它排序
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// 声明时给出的泛型参数类型
    pub fn param_type(&self) -> Option<TypeId> {
        self.param.map(|(id, _)| id)
    }

    pub fn param_name(&self) -> Option<&'static str> {
        self.param.map(|(_, name)| name)
    }

    /// 泛型参数是否为 `P`；未声明参数的绑定总是返回 true
    pub fn accepts_param<P: 'static>(&self) -> bool {
        self.param_type().is_none_or(|id| id == TypeId::of::<P>())
    }

    pub(crate) fn matches(&self, subscriber: ObjectKey, method: &str) -> bool {
        self.subscriber == subscriber && self.method == method
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    pub(crate) fn deactivate(&self) {
        self.active.set(false);
    }

    pub(crate) fn invoke(&self, ctx: &LoopContext, event: &dyn Any) -> HandlerResult {
        (self.invoke)(ctx, event)
    }
}

impl fmt::Debug for EventBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBinding")
            .field("event", &self.event_name)
            .field("subscriber", &self.subscriber_type)
            .field("method", &self.method)
            .field("priority", &self.priority)
            .field("owner", &self.owner)
            .field("param", &self.param_name())
            .finish()
    }
}

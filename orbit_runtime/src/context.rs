//! Loop 上下文
//!
//! 在 Loop 线程上创建，生命周期内不离开该线程。所有任务、事件处理器、
//! cron/tick 处理器都会拿到它的引用。

use crate::entity::{Components, EntityManager, EntityRef};
use crate::event::{Event, EventBus};
use crate::executor::{Loop, LoopGroup, LoopSettings};
use crate::schedule::{Scheduler, TickManager};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// 组件构造器，Loop 线程启动后依次调用
pub type ComponentInstaller = Arc<dyn Fn(&LoopContext) + Send + Sync>;

/// Loop 线程私有的状态
pub struct LoopContext {
    loop_handle: Arc<Loop>,
    components: Components,
    event_bus: EventBus,
    scheduler: Scheduler,
    tick_manager: TickManager,
    entity_manager: EntityManager,
}

impl LoopContext {
    pub(crate) fn new(lp: Arc<Loop>, settings: &LoopSettings) -> Rc<Self> {
        Rc::new_cyclic(|ctx| Self {
            components: Components::new(lp.id()),
            event_bus: EventBus::new(ctx.clone(), settings.max_event_depth),
            scheduler: Scheduler::new(ctx.clone(), Arc::clone(&settings.evaluator)),
            tick_manager: TickManager::new(ctx.clone()),
            entity_manager: EntityManager::new(ctx.clone()),
            loop_handle: lp,
        })
    }

    /// 所属 Loop
    pub fn loop_handle(&self) -> &Arc<Loop> {
        &self.loop_handle
    }

    pub fn loop_id(&self) -> &str {
        self.loop_handle.id()
    }

    /// 所属 LoopGroup
    pub fn group(&self) -> Option<Arc<LoopGroup>> {
        self.loop_handle.group()
    }

    /// Loop 自身的组件
    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn tick_manager(&self) -> &TickManager {
        &self.tick_manager
    }

    pub fn entity_manager(&self) -> &EntityManager {
        &self.entity_manager
    }

    /// 派发事件，见 [`EventBus::post`]
    pub fn post<E: Event>(&self, event: E) -> usize {
        self.event_bus.post(event)
    }

    /// 见 [`EntityManager::register_entity`]
    pub fn register_entity(&self, entity: impl Into<EntityRef>) -> bool {
        self.entity_manager.register_entity(entity)
    }

    /// 见 [`EntityManager::unregister_entity`]
    pub fn unregister_entity(&self, id: &str) -> Option<EntityRef> {
        self.entity_manager.unregister_entity(id)
    }

    /// 把 Loop 自身的组件挂到各子系统上
    pub(crate) fn attach_components(&self) -> usize {
        EntityManager::attach(self, &self.components.subscribers())
    }
}

impl fmt::Debug for LoopContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopContext")
            .field("loop_id", &self.loop_id())
            .field("components", &self.components)
            .field("entities", &self.entity_manager.entity_count())
            .finish()
    }
}

//! Orbit 运行时
//!
//! 每个 [`Loop`] 独占一个线程。Loop 内有三个子系统：事件总线、cron 调度器
//! 和 tick 管理器；实体注册时自身及组件声明的处理器会依次挂到这三个子系统上。
//!
//! ```rust,ignore
//! let group = LoopGroup::builder().config(config).build()?;
//! let lp = group.select_next().unwrap();
//!
//! let registered = lp
//!     .submit(|ctx| ctx.register_entity(Rc::new(BasicEntity::new("npc-1"))))
//!     .join()?;
//! ```

pub mod bind;
pub mod context;
pub mod entity;
pub mod event;
pub mod executor;
pub mod metrics;
pub mod schedule;

#[cfg(test)]
pub(crate) mod testing;

// 导出主要类型到 crate root
pub use crate::bind::{Bindable, Binder, HandlerResult, ObjectKey, Subscriber, TickSpec};
pub use crate::context::{ComponentInstaller, LoopContext};
pub use crate::entity::{
    BasicEntity, Component, Components, Entity, EntityManager, EntityRef, EntityRegistered,
    EntityRegistering, EntityUnregistered, EntityUnregistering,
};
pub use crate::event::{Event, EventBinding, EventBus};
pub use crate::executor::{
    Loop, LoopFuture, LoopGroup, LoopGroupBuilder, LoopSettings, Runnable, ScheduledHandle,
};
pub use crate::metrics::{LoopMetrics, MetricsSink, NoopMetrics};
pub use crate::schedule::{Scheduler, TickManager};

// 预导出
pub mod prelude {
    pub use crate::bind::{Bindable, Binder, HandlerResult, Subscriber, TickSpec};
    pub use crate::context::LoopContext;
    pub use crate::entity::{BasicEntity, Component, Components, Entity, EntityRef};
    pub use crate::event::{Event, EventBinding};
    pub use crate::executor::{Loop, LoopFuture, LoopGroup, LoopGroupBuilder, ScheduledHandle};
    pub use crate::metrics::MetricsSink;
}

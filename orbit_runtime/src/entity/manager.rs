//! 实体注册表
//!
//! 注册流程：`EntityRegistering` → EventBus → Scheduler → TickManager → 写入注册表
//! → `EntityRegistered`。每个子系统内实体先于组件。注销完全逆序。

use super::{EntityRef, EntityRegistered, EntityRegistering, EntityUnregistered, EntityUnregistering};
use crate::bind::Subscriber;
use crate::context::LoopContext;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// 注册流水线的一个环节
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    EventBus,
    Scheduler,
    TickManager,
}

/// 挂载顺序，卸载时倒序
const PIPELINE: [Stage; 3] = [Stage::EventBus, Stage::Scheduler, Stage::TickManager];

impl Stage {
    fn attach(self, ctx: &LoopContext, subscriber: &Subscriber) -> usize {
        match self {
            Stage::EventBus => ctx.event_bus().register(subscriber),
            Stage::Scheduler => ctx.scheduler().register_all(subscriber),
            Stage::TickManager => ctx.tick_manager().register_all(subscriber),
        }
    }

    fn detach(self, ctx: &LoopContext, subscriber: &Subscriber) -> usize {
        match self {
            Stage::EventBus => ctx.event_bus().unregister(subscriber),
            Stage::Scheduler => ctx.scheduler().unregister(subscriber, None),
            Stage::TickManager => ctx.tick_manager().unregister(subscriber, None),
        }
    }
}

/// 展开流水线：(环节, 订阅者下标)
///
/// 挂载时按环节顺序、每个环节内按订阅者顺序；卸载时两层都倒序。
fn steps(subscribers: usize, detaching: bool) -> Vec<(Stage, usize)> {
    let mut steps: Vec<(Stage, usize)> = PIPELINE
        .iter()
        .flat_map(|&stage| (0..subscribers).map(move |index| (stage, index)))
        .collect();
    if detaching {
        steps.reverse();
    }
    steps
}

/// Loop 内实体注册表
///
/// 同一 Loop 内实体 ID 共用一个命名空间。
pub struct EntityManager {
    ctx: Weak<LoopContext>,
    entities: RefCell<HashMap<String, EntityRef>>,
}

impl EntityManager {
    pub(crate) fn new(ctx: Weak<LoopContext>) -> Self {
        Self {
            ctx,
            entities: RefCell::new(HashMap::new()),
        }
    }

    /// 注册实体，ID 已存在时返回 false
    pub fn register_entity(&self, entity: impl Into<EntityRef>) -> bool {
        let entity = entity.into();
        let Some(ctx) = self.ctx.upgrade() else {
            return false;
        };
        if self.has_entity(entity.id()) {
            warn!(loop_id = %ctx.loop_id(), entity = entity.id(), "实体 ID 已存在");
            return false;
        }

        ctx.post(EntityRegistering {
            entity: entity.clone(),
        });
        // 前置事件的处理器可能抢先注册了同一个 ID
        if self.has_entity(entity.id()) {
            warn!(loop_id = %ctx.loop_id(), entity = entity.id(), "实体 ID 已存在");
            return false;
        }

        let bound = Self::attach(&ctx, &entity.subscribers());
        let count = {
            let mut entities = self.entities.borrow_mut();
            entities.insert(entity.id().to_string(), entity.clone());
            entities.len()
        };
        ctx.loop_handle().metrics().set_live_entities(count);
        ctx.loop_handle()
            .metrics_sink()
            .record_gauge("entity.count", ctx.loop_id(), count as f64);
        debug!(loop_id = %ctx.loop_id(), entity = entity.id(), bindings = bound, "实体已注册");

        ctx.post(EntityRegistered { entity });
        true
    }

    /// 注销实体，返回被移除的实体
    pub fn unregister_entity(&self, id: &str) -> Option<EntityRef> {
        let ctx = self.ctx.upgrade()?;
        let entity = self.entity(id)?;

        ctx.post(EntityUnregistering {
            entity: entity.clone(),
        });

        let unbound = Self::detach(&ctx, &entity.subscribers());
        let count = {
            let mut entities = self.entities.borrow_mut();
            // 只移除同一个实例，前置事件的处理器可能已替换了它
            if entities.get(id).is_some_and(|current| current.ptr_eq(&entity)) {
                entities.remove(id);
            }
            entities.len()
        };
        ctx.loop_handle().metrics().set_live_entities(count);
        ctx.loop_handle()
            .metrics_sink()
            .record_gauge("entity.count", ctx.loop_id(), count as f64);
        debug!(loop_id = %ctx.loop_id(), entity = id, bindings = unbound, "实体已注销");

        ctx.post(EntityUnregistered {
            entity: entity.clone(),
        });
        Some(entity)
    }

    /// 按流水线顺序挂载，返回产生的绑定数
    pub(crate) fn attach(ctx: &LoopContext, subscribers: &[Subscriber]) -> usize {
        steps(subscribers.len(), false)
            .into_iter()
            .map(|(stage, index)| stage.attach(ctx, &subscribers[index]))
            .sum()
    }

    /// 按流水线逆序卸载，返回移除的绑定数
    pub(crate) fn detach(ctx: &LoopContext, subscribers: &[Subscriber]) -> usize {
        steps(subscribers.len(), true)
            .into_iter()
            .map(|(stage, index)| stage.detach(ctx, &subscribers[index]))
            .sum()
    }

    pub fn has_entity(&self, id: &str) -> bool {
        self.entities.borrow().contains_key(id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.borrow().len()
    }

    pub fn entity(&self, id: &str) -> Option<EntityRef> {
        self.entities.borrow().get(id).cloned()
    }

    /// 按具体类型取实体
    pub fn entity_as<T: super::Entity>(&self, id: &str) -> Option<Rc<T>> {
        self.entity(id)?.downcast::<T>()
    }

    /// 注册表快照
    pub fn entity_map(&self) -> HashMap<String, EntityRef> {
        self.entities.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::{Bindable, Binder, TickSpec};
    use crate::entity::{BasicEntity, Component, Components, Entity};
    use crate::event::Event;
    use crate::testing::with_loop;
    use orbit_core::TimeUnit;
    use std::cell::RefCell;

    struct Hit;

    impl Event for Hit {}

    /// 记录生命周期事件时各子系统的状态
    #[derive(Default)]
    struct Observer {
        log: RefCell<Vec<String>>,
    }

    impl Bindable for Observer {
        fn bind(binder: &mut Binder<Self>) {
            binder
                .on::<EntityRegistering>("pre", |o, ctx, e| {
                    o.log.borrow_mut().push(format!(
                        "pre:{}:{}",
                        e.entity.id(),
                        ctx.event_bus().has_subscribers::<Hit>()
                    ));
                    Ok(())
                })
                .on::<EntityRegistered>("post", |o, ctx, e| {
                    o.log.borrow_mut().push(format!(
                        "post:{}:{}:{}",
                        e.entity.id(),
                        ctx.entity_manager().has_entity(e.entity.id()),
                        ctx.tick_manager().job_count()
                    ));
                    Ok(())
                })
                .on::<EntityUnregistering>("pre_remove", |o, _, e| {
                    o.log.borrow_mut().push(format!("pre_remove:{}", e.entity.id()));
                    Ok(())
                })
                .on::<EntityUnregistered>("post_remove", |o, ctx, e| {
                    o.log.borrow_mut().push(format!(
                        "post_remove:{}:{}",
                        e.entity.id(),
                        ctx.event_bus().has_subscribers::<Hit>()
                    ));
                    Ok(())
                });
        }
    }

    struct Knight {
        id: String,
        components: Components,
    }

    impl Bindable for Knight {
        fn bind(binder: &mut Binder<Self>) {
            binder.on::<Hit>("knight_hit", |_, _, _| Ok(()));
        }
    }

    impl Entity for Knight {
        fn id(&self) -> &str {
            &self.id
        }

        fn components(&self) -> &Components {
            &self.components
        }
    }

    struct Armor;

    impl Bindable for Armor {
        fn bind(binder: &mut Binder<Self>) {
            binder
                .on::<Hit>("armor_hit", |_, _, _| Ok(()))
                .tick("wear", TickSpec::every(1, TimeUnit::Hours), |_, _, _, _| Ok(()));
        }
    }

    impl Component for Armor {}

    fn knight(id: &str) -> Rc<Knight> {
        let knight = Knight {
            id: id.to_string(),
            components: Components::new(id),
        };
        knight.components.add(Rc::new(Armor));
        Rc::new(knight)
    }

    #[test]
    fn test_pipeline_steps_order() {
        use Stage::{EventBus, Scheduler, TickManager};
        assert_eq!(
            steps(2, false),
            vec![
                (EventBus, 0),
                (EventBus, 1),
                (Scheduler, 0),
                (Scheduler, 1),
                (TickManager, 0),
                (TickManager, 1),
            ]
        );
        assert_eq!(
            steps(2, true),
            vec![
                (TickManager, 1),
                (TickManager, 0),
                (Scheduler, 1),
                (Scheduler, 0),
                (EventBus, 1),
                (EventBus, 0),
            ]
        );
        assert!(steps(0, true).is_empty());
    }

    #[test]
    fn test_lifecycle_ordering() {
        let (log, order) = with_loop(|ctx| {
            let observer = Rc::new(Observer::default());
            ctx.event_bus().register(&Subscriber::new(Rc::clone(&observer)));

            assert!(ctx.register_entity(knight("k1")));
            let order: Vec<&str> = ctx
                .event_bus()
                .bindings_of::<Hit>()
                .iter()
                .map(|b| b.method())
                .collect();
            assert_eq!(ctx.entity_manager().entity_count(), 1);

            assert!(ctx.unregister_entity("k1").is_some());
            let log = observer.log.borrow().clone();
            (log, order)
        });

        assert_eq!(
            log,
            vec![
                "pre:k1:false",
                "post:k1:true:1",
                "pre_remove:k1",
                "post_remove:k1:false",
            ]
        );
        assert_eq!(order, vec!["knight_hit", "armor_hit"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (second, count) = with_loop(|ctx| {
            assert!(ctx.register_entity(knight("k1")));
            let second = ctx.register_entity(Rc::new(BasicEntity::new("k1")));
            (second, ctx.entity_manager().entity_count())
        });
        assert!(!second);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_unregister_removes_all_bindings() {
        let (bindings, ticks, missing) = with_loop(|ctx| {
            ctx.register_entity(knight("k1"));
            ctx.unregister_entity("k1");
            (
                ctx.event_bus().binding_count(),
                ctx.tick_manager().job_count(),
                ctx.unregister_entity("k1").is_none(),
            )
        });
        assert_eq!((bindings, ticks), (0, 0));
        assert!(missing);
    }

    #[test]
    fn test_entity_snapshot() {
        let (ids, typed) = with_loop(|ctx| {
            ctx.register_entity(knight("a"));
            ctx.register_entity(Rc::new(BasicEntity::new("b")));
            let snapshot = ctx.entity_manager().entity_map();
            ctx.unregister_entity("a");

            let mut ids: Vec<String> = snapshot.keys().cloned().collect();
            ids.sort();
            (ids, ctx.entity_manager().entity_as::<BasicEntity>("b").is_some())
        });
        assert_eq!(ids, vec!["a", "b"]);
        assert!(typed);
    }
}

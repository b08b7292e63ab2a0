//! 组件容器

use crate::bind::{Bindable, Subscriber};
use std::any::TypeId;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// 绑定到某个实体的能力对象
pub trait Component: Bindable {
    /// 加入实体时调用，`owner` 为实体 ID
    fn on_attach(&self, owner: &str) {
        let _ = owner;
    }
}

/// 按类型索引的组件集合，保持加入顺序
pub struct Components {
    owner: Rc<str>,
    slots: RefCell<Vec<Subscriber>>,
}

impl Components {
    pub fn new(owner: impl Into<Rc<str>>) -> Self {
        Self {
            owner: owner.into(),
            slots: RefCell::new(Vec::new()),
        }
    }

    /// 所属实体 ID
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// 添加组件，同类型的旧组件被替换并返回
    ///
    /// 实体已注册时新组件不会自动挂到各子系统上。
    pub fn add<C: Component>(&self, component: Rc<C>) -> Option<Rc<C>> {
        component.on_attach(&self.owner);
        let subscriber = Subscriber::new(component).with_owner(Rc::clone(&self.owner));

        let mut slots = self.slots.borrow_mut();
        match slots.iter_mut().find(|slot| slot.is::<C>()) {
            Some(slot) => std::mem::replace(slot, subscriber).downcast::<C>(),
            None => {
                slots.push(subscriber);
                None
            }
        }
    }

    pub fn get<C: Component>(&self) -> Option<Rc<C>> {
        self.slots
            .borrow()
            .iter()
            .find(|slot| slot.is::<C>())
            .and_then(Subscriber::downcast::<C>)
    }

    pub fn has<C: Component>(&self) -> bool {
        self.slots.borrow().iter().any(|slot| slot.is::<C>())
    }

    pub fn remove<C: Component>(&self) -> Option<Rc<C>> {
        let mut slots = self.slots.borrow_mut();
        let index = slots.iter().position(|slot| slot.is::<C>())?;
        slots.remove(index).downcast::<C>()
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    /// 全部组件的订阅者句柄，按加入顺序，去重
    pub fn subscribers(&self) -> Vec<Subscriber> {
        let mut seen = Vec::new();
        self.slots
            .borrow()
            .iter()
            .filter(|slot| {
                let key = slot.key();
                if seen.contains(&key) {
                    false
                } else {
                    seen.push(key);
                    true
                }
            })
            .cloned()
            .collect()
    }

    /// 组件类型列表
    pub fn types(&self) -> Vec<TypeId> {
        self.slots.borrow().iter().map(|slot| slot.key().type_id()).collect()
    }
}

impl fmt::Debug for Components {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.slots.borrow().iter().map(Subscriber::type_name).collect();
        f.debug_struct("Components")
            .field("owner", &self.owner)
            .field("components", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::Binder;
    use std::cell::OnceCell;

    #[derive(Default)]
    struct Health {
        owner: OnceCell<String>,
        value: u32,
    }

    impl Bindable for Health {
        fn bind(_binder: &mut Binder<Self>) {}
    }

    impl Component for Health {
        fn on_attach(&self, owner: &str) {
            let _ = self.owner.set(owner.to_string());
        }
    }

    struct Mana;

    impl Bindable for Mana {
        fn bind(_binder: &mut Binder<Self>) {}
    }

    impl Component for Mana {}

    #[test]
    fn test_add_get_remove() {
        let components = Components::new("hero");
        assert!(components.is_empty());

        assert!(components.add(Rc::new(Health::default())).is_none());
        components.add(Rc::new(Mana));
        assert_eq!(components.len(), 2);
        assert!(components.has::<Mana>());

        let health = components.get::<Health>().unwrap();
        assert_eq!(health.owner.get().map(String::as_str), Some("hero"));

        assert!(components.remove::<Mana>().is_some());
        assert!(!components.has::<Mana>());
        assert!(components.remove::<Mana>().is_none());
    }

    #[test]
    fn test_replace_keeps_position() {
        let components = Components::new("hero");
        components.add(Rc::new(Health { value: 1, ..Default::default() }));
        components.add(Rc::new(Mana));

        let old = components.add(Rc::new(Health { value: 2, ..Default::default() })).unwrap();
        assert_eq!(old.value, 1);
        assert_eq!(components.get::<Health>().unwrap().value, 2);
        assert_eq!(components.types()[0], TypeId::of::<Health>());
    }

    #[test]
    fn test_subscribers_carry_owner() {
        let components = Components::new("hero");
        components.add(Rc::new(Mana));
        let subscribers = components.subscribers();
        assert_eq!(subscribers.len(), 1);
        assert_eq!(subscribers[0].owner(), Some("hero"));
    }
}

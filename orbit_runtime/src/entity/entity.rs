//! 实体

use super::{Component, Components};
use crate::bind::{Bindable, Binder, Subscriber};
use std::any::{Any, type_name};
use std::fmt;
use std::rc::Rc;

/// 带唯一 ID 的组件容器
///
/// 实体自身也可以声明处理器；注册时先于它的组件挂到各子系统上。
pub trait Entity: Bindable {
    /// 实体 ID，在所属注册表中唯一
    fn id(&self) -> &str;

    /// 组件集合
    fn components(&self) -> &Components;
}

/// 没有自身处理器的实体
pub struct BasicEntity {
    id: String,
    components: Components,
}

impl BasicEntity {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let components = Components::new(id.as_str());
        Self { id, components }
    }

    /// 链式添加组件
    pub fn with_component<C: Component>(self, component: Rc<C>) -> Self {
        self.components.add(component);
        self
    }
}

impl Bindable for BasicEntity {
    fn bind(_binder: &mut Binder<Self>) {}
}

impl Entity for BasicEntity {
    fn id(&self) -> &str {
        &self.id
    }

    fn components(&self) -> &Components {
        &self.components
    }
}

impl fmt::Debug for BasicEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicEntity")
            .field("id", &self.id)
            .field("components", &self.components)
            .finish()
    }
}

trait EntityObject {
    fn entity_id(&self) -> &str;
    fn entity_components(&self) -> &Components;
    fn entity_type(&self) -> &'static str;
    fn subscriber(self: Rc<Self>) -> Subscriber;
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

impl<T: Entity> EntityObject for T {
    fn entity_id(&self) -> &str {
        self.id()
    }

    fn entity_components(&self) -> &Components {
        self.components()
    }

    fn entity_type(&self) -> &'static str {
        type_name::<T>()
    }

    fn subscriber(self: Rc<Self>) -> Subscriber {
        let owner: Rc<str> = Rc::from(self.id());
        Subscriber::new(self).with_owner(owner)
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// 类型擦除的实体句柄
#[derive(Clone)]
pub struct EntityRef(Rc<dyn EntityObject>);

impl EntityRef {
    pub fn new<T: Entity>(entity: Rc<T>) -> Self {
        Self(entity)
    }

    pub fn id(&self) -> &str {
        self.0.entity_id()
    }

    pub fn components(&self) -> &Components {
        self.0.entity_components()
    }

    /// 具体类型名
    pub fn type_name(&self) -> &'static str {
        self.0.entity_type()
    }

    /// 实体自身的订阅者句柄
    pub fn subscriber(&self) -> Subscriber {
        Rc::clone(&self.0).subscriber()
    }

    /// 实体在前、组件在后的订阅者列表
    pub(crate) fn subscribers(&self) -> Vec<Subscriber> {
        let mut subscribers = vec![self.subscriber()];
        subscribers.extend(self.components().subscribers());
        subscribers
    }

    /// 取回具体类型
    pub fn downcast<T: Entity>(&self) -> Option<Rc<T>> {
        Rc::clone(&self.0).into_any().downcast::<T>().ok()
    }

    /// 是否指向同一个实例
    pub fn ptr_eq(&self, other: &EntityRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Entity> From<Rc<T>> for EntityRef {
    fn from(entity: Rc<T>) -> Self {
        Self::new(entity)
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef")
            .field("id", &self.id())
            .field("type", &self.type_name())
            .finish()
    }
}

//! 实体与组件
//!
//! 实体是带唯一 ID 的组件容器。注册到 [`EntityManager`] 后，实体及其组件
//! 声明的处理器会依次挂到 EventBus、Scheduler、TickManager 上。

mod component;
#[allow(clippy::module_inception)]
mod entity;
mod lifecycle;
mod manager;

pub use component::{Component, Components};
pub use entity::{BasicEntity, Entity, EntityRef};
pub use lifecycle::{EntityRegistered, EntityRegistering, EntityUnregistered, EntityUnregistering};
pub use manager::EntityManager;

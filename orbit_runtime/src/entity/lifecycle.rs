//! 实体注册生命周期事件
//!
//! `*ing` 事件在各子系统处理之前派发，`*ed` 事件在注册表更新之后派发。

use super::EntityRef;
use crate::event::Event;

/// 即将注册
#[derive(Debug, Clone)]
pub struct EntityRegistering {
    pub entity: EntityRef,
}

/// 已注册
#[derive(Debug, Clone)]
pub struct EntityRegistered {
    pub entity: EntityRef,
}

/// 即将注销
#[derive(Debug, Clone)]
pub struct EntityUnregistering {
    pub entity: EntityRef,
}

/// 已注销
#[derive(Debug, Clone)]
pub struct EntityUnregistered {
    pub entity: EntityRef,
}

impl Event for EntityRegistering {}
impl Event for EntityRegistered {}
impl Event for EntityUnregistering {}
impl Event for EntityUnregistered {}

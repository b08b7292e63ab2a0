//! Loop 内事件总线
//!
//! 事件只在所属 Loop 的线程上派发，跨 Loop 通信请用 `submit`。

mod binding;
mod bus;

pub use binding::EventBinding;
pub use bus::EventBus;

use std::any::Any;

/// 可派发的事件
///
/// 默认投递给所有绑定；覆盖 [`Event::accept`] 可以按实体或泛型参数过滤。
///
/// ```rust,ignore
/// struct Damage { target: String, amount: u32 }
///
/// impl Event for Damage {
///     fn accept(&self, binding: &EventBinding) -> bool {
///         binding.owner() == Some(self.target.as_str())
///     }
/// }
/// ```
pub trait Event: Any {
    /// 是否投递给该绑定
    fn accept(&self, binding: &EventBinding) -> bool {
        let _ = binding;
        true
    }
}

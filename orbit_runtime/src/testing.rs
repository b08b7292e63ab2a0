//! 测试辅助

use crate::context::LoopContext;
use crate::executor::{Loop, LoopSettings};
use std::sync::Arc;
use std::time::Duration;

pub fn spawn_loop(id: &str) -> Arc<Loop> {
    Loop::spawn(id, LoopSettings::default()).unwrap()
}

/// 在一个临时 Loop 上执行 `f` 并返回结果
pub fn with_loop<R, F>(f: F) -> R
where
    R: Send + 'static,
    F: FnOnce(&LoopContext) -> R + Send + 'static,
{
    let lp = spawn_loop("test-loop");
    let result = lp.submit(f).join().unwrap();
    lp.shutdown();
    assert!(lp.await_termination(Duration::from_secs(5)));
    result
}

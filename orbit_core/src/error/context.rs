//! 错误上下文
//!
//! 为错误附加 Loop 或键值形式的定位信息。

use std::fmt;

/// 错误上下文信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorContext {
    /// 所属 Loop
    Loop(String),
    /// 键值对上下文，如 `cron: */5 * * * * *`
    KeyValue(String, String),
}

impl ErrorContext {
    /// Loop 上下文
    pub fn in_loop(id: impl Into<String>) -> Self {
        ErrorContext::Loop(id.into())
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorContext::Loop(id) => write!(f, "loop: {}", id),
            ErrorContext::KeyValue(key, value) => write!(f, "{}: {}", key, value),
        }
    }
}

impl From<(&str, String)> for ErrorContext {
    fn from((key, value): (&str, String)) -> Self {
        ErrorContext::KeyValue(key.to_string(), value)
    }
}

impl From<(&str, &str)> for ErrorContext {
    fn from((key, value): (&str, &str)) -> Self {
        ErrorContext::KeyValue(key.to_string(), value.to_string())
    }
}

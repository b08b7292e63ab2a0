//! Orbit 框架核心错误类型
//!
//! 定义所有框架级别的错误类型。

use super::context::ErrorContext;
use orbit_config::ConfigError;
use std::any::Any;
use std::io;
use thiserror::Error;

/// Orbit 框架核心错误类型
#[derive(Error, Debug)]
pub enum OrbitError {
    /// IO 错误（如线程创建失败）
    #[error("IO 错误: {0}")]
    Io(#[from] io::Error),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 验证错误
    #[error("验证失败: {0}")]
    Validation(String),

    /// Loop 已关闭，任务被拒绝
    #[error("任务被拒绝: {0}")]
    Rejected(String),

    /// 任务在执行前被丢弃
    #[error("任务已取消")]
    Cancelled,

    /// 任务执行时 panic
    #[error("任务 panic: {0}")]
    TaskPanicked(String),

    /// cron 表达式错误
    #[error("cron 表达式错误: {0}")]
    Cron(String),

    /// 调度失败
    #[error("调度失败: {0}")]
    Scheduling(String),

    /// 带上下文的错误
    #[error("{0} ({1})")]
    WithContext(#[source] Box<OrbitError>, ErrorContext),
}

impl OrbitError {
    /// 获取错误类型
    pub fn kind(&self) -> OrbitErrorKind {
        match self {
            OrbitError::Io(_) => OrbitErrorKind::Io,
            OrbitError::Config(_) => OrbitErrorKind::Config,
            OrbitError::Validation(_) => OrbitErrorKind::Validation,
            OrbitError::Rejected(_) => OrbitErrorKind::Rejected,
            OrbitError::Cancelled => OrbitErrorKind::Cancelled,
            OrbitError::TaskPanicked(_) => OrbitErrorKind::TaskPanicked,
            OrbitError::Cron(_) => OrbitErrorKind::Cron,
            OrbitError::Scheduling(_) => OrbitErrorKind::Scheduling,
            OrbitError::WithContext(inner, _) => inner.kind(),
        }
    }

    /// 添加上下文信息
    pub fn with_context<C>(self, context: C) -> Self
    where
        C: Into<ErrorContext>,
    {
        OrbitError::WithContext(Box::new(self), context.into())
    }

    /// 创建配置错误
    pub fn config(msg: impl Into<String>) -> Self {
        OrbitError::Config(msg.into())
    }

    /// 创建验证错误
    pub fn validation(msg: impl Into<String>) -> Self {
        OrbitError::Validation(msg.into())
    }

    /// 创建拒绝错误
    pub fn rejected(msg: impl Into<String>) -> Self {
        OrbitError::Rejected(msg.into())
    }

    /// 创建 cron 错误
    pub fn cron(msg: impl Into<String>) -> Self {
        OrbitError::Cron(msg.into())
    }

    /// 创建调度错误
    pub fn scheduling(msg: impl Into<String>) -> Self {
        OrbitError::Scheduling(msg.into())
    }

    /// 从 panic 负载创建错误
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        OrbitError::TaskPanicked(panic_message(payload))
    }
}

impl From<ConfigError> for OrbitError {
    fn from(err: ConfigError) -> Self {
        OrbitError::Config(err.to_string())
    }
}

/// 提取 panic 负载中的消息文本
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "未知 panic".to_string()
    }
}

/// 错误类型分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrbitErrorKind {
    /// IO 错误
    Io,
    /// 配置错误
    Config,
    /// 验证错误
    Validation,
    /// 任务被拒绝
    Rejected,
    /// 任务已取消
    Cancelled,
    /// 任务 panic
    TaskPanicked,
    /// cron 表达式错误
    Cron,
    /// 调度失败
    Scheduling,
}

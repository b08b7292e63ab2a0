//! 配置管理系统
//!
//! 提供 LoopGroup 的构造配置，支持 TOML 文件和环境变量覆盖。

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析错误
    #[error("解析配置文件失败: {0}")]
    Parse(String),

    /// 验证错误
    #[error("配置验证失败: {0}")]
    Validation(String),

    /// 环境变量错误
    #[error("环境变量解析失败: {0}")]
    EnvVar(String),
}

/// 配置 Result 类型
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Loop 数量上限
pub const MAX_LOOP_COUNT: usize = 512;

/// LoopGroup 配置
///
/// 构造时一次性消费，运行期间不可变。
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoopGroupConfig {
    /// LoopGroup 标识
    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Loop ID 前缀
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,

    /// Loop ID 起始序号
    #[serde(default)]
    pub id_counter: u32,

    /// 是否为守护线程（true 时 LoopGroup 销毁不等待线程退出）
    #[serde(default)]
    pub daemon: bool,

    /// Loop 数量（None 表示使用 CPU 核心数）
    #[serde(default)]
    pub loop_count: Option<usize>,

    /// 事件嵌套派发的最大深度
    #[serde(default = "default_max_event_depth")]
    pub max_event_depth: usize,
}

impl Default for LoopGroupConfig {
    fn default() -> Self {
        Self {
            group_id: default_group_id(),
            id_prefix: default_id_prefix(),
            id_counter: 0,
            daemon: false,
            loop_count: None,
            max_event_depth: default_max_event_depth(),
        }
    }
}

impl LoopGroupConfig {
    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 字符串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// 从环境变量加载配置并覆盖
    ///
    /// 支持的环境变量：
    /// - ORBIT_GROUP_ID: LoopGroup 标识
    /// - ORBIT_ID_PREFIX: Loop ID 前缀
    /// - ORBIT_ID_COUNTER: Loop ID 起始序号
    /// - ORBIT_DAEMON: 守护线程 (true/false)
    /// - ORBIT_LOOP_COUNT: Loop 数量
    /// - ORBIT_MAX_EVENT_DEPTH: 事件嵌套最大深度
    pub fn load_with_env_override(mut self) -> Result<Self> {
        if let Ok(group_id) = std::env::var("ORBIT_GROUP_ID") {
            self.group_id = group_id;
        }

        if let Ok(prefix) = std::env::var("ORBIT_ID_PREFIX") {
            self.id_prefix = prefix;
        }

        if let Ok(counter) = std::env::var("ORBIT_ID_COUNTER") {
            self.id_counter = counter
                .parse()
                .map_err(|_| ConfigError::EnvVar("ORBIT_ID_COUNTER 必须是有效的 u32 数字".to_string()))?;
        }

        if let Ok(daemon) = std::env::var("ORBIT_DAEMON") {
            self.daemon = daemon
                .parse()
                .map_err(|_| ConfigError::EnvVar("ORBIT_DAEMON 必须是 true 或 false".to_string()))?;
        }

        if let Ok(count) = std::env::var("ORBIT_LOOP_COUNT") {
            self.loop_count = Some(count.parse().map_err(|_| {
                ConfigError::EnvVar("ORBIT_LOOP_COUNT 必须是有效的 usize 数字".to_string())
            })?);
        }

        if let Ok(depth) = std::env::var("ORBIT_MAX_EVENT_DEPTH") {
            self.max_event_depth = depth.parse().map_err(|_| {
                ConfigError::EnvVar("ORBIT_MAX_EVENT_DEPTH 必须是有效的 usize 数字".to_string())
            })?;
        }

        Ok(self)
    }

    /// 从文件加载并应用环境变量覆盖
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_file(path)?.load_with_env_override()
    }

    /// 验证配置是否有效
    pub fn validate(&self) -> Result<()> {
        if self.group_id.trim().is_empty() {
            return Err(ConfigError::Validation("group_id 不能为空".to_string()));
        }

        if let Some(count) = self.loop_count {
            if count == 0 {
                return Err(ConfigError::Validation("Loop 数量不能为 0".to_string()));
            }
            if count > MAX_LOOP_COUNT {
                return Err(ConfigError::Validation(format!(
                    "Loop 数量过大 (建议 <= {})",
                    MAX_LOOP_COUNT
                )));
            }
        }

        if self.max_event_depth == 0 {
            return Err(ConfigError::Validation("事件嵌套深度不能为 0".to_string()));
        }

        Ok(())
    }

    /// 第 `index` 个 Loop 的 ID
    pub fn loop_id(&self, index: usize) -> String {
        format!("{}{}", self.id_prefix, self.id_counter as usize + index)
    }

    /// 获取配置摘要信息
    pub fn summary(&self) -> String {
        format!(
            "Orbit LoopGroup 配置:\n  分组: {}\n  Loop 数量: {:?}\n  ID 前缀: {}\n  守护线程: {}\n  事件深度: {}",
            self.group_id, self.loop_count, self.id_prefix, self.daemon, self.max_event_depth
        )
    }
}

// 默认值函数
fn default_group_id() -> String {
    "orbit".to_string()
}

fn default_id_prefix() -> String {
    "loop-".to_string()
}

fn default_max_event_depth() -> usize {
    20
}

//! LoopGroup 构建器

use super::group::LoopGroup;
use super::worker::{Loop, LoopSettings};
use crate::context::{ComponentInstaller, LoopContext};
use crate::metrics::MetricsSink;
use orbit_config::LoopGroupConfig;
use orbit_core::{CronEvaluator, Result};
use std::sync::Arc;
use tracing::{error, info};

/// LoopGroup 构建器
///
/// # Example
///
/// ```rust,no_run,ignore
/// let group = LoopGroup::builder()
///     .config(LoopGroupConfig::from_file_with_env("orbit.toml")?)
///     .component(|ctx| {
///         ctx.components().add(Rc::new(Matchmaker::default()));
///     })
///     .build()?;
///
/// let lp = group.select_hashing(&player_id).unwrap();
/// lp.submit(move |ctx| ctx.register_entity(Rc::new(Player::new(player_id))));
/// ```
pub struct LoopGroupBuilder {
    config: LoopGroupConfig,
    settings: LoopSettings,
}

impl LoopGroupBuilder {
    pub fn new() -> Self {
        Self {
            config: LoopGroupConfig::default(),
            settings: LoopSettings::default(),
        }
    }

    /// 使用指定配置
    pub fn config(mut self, config: LoopGroupConfig) -> Self {
        self.config = config;
        self
    }

    /// 添加组件构造器，每个 Loop 启动时在其线程上调用一次
    ///
    /// 构造器加入的 Loop 组件会自动挂到该 Loop 的各子系统上。
    pub fn component<F>(mut self, installer: F) -> Self
    where
        F: Fn(&LoopContext) + Send + Sync + 'static,
    {
        let installer: ComponentInstaller = Arc::new(installer);
        self.settings.components.push(installer);
        self
    }

    /// 替换 cron 求值器
    pub fn evaluator(mut self, evaluator: Arc<dyn CronEvaluator>) -> Self {
        self.settings.evaluator = evaluator;
        self
    }

    /// 设置指标上报
    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.settings.metrics_sink = sink;
        self
    }

    /// 启动全部 Loop 并组成分组
    ///
    /// 任一 Loop 启动失败时，已启动的 Loop 会被关闭。
    pub fn build(self) -> Result<Arc<LoopGroup>> {
        self.config.validate()?;

        let count = self.config.loop_count.unwrap_or_else(num_cpus::get).max(1);
        let settings = LoopSettings {
            max_event_depth: self.config.max_event_depth,
            ..self.settings
        };

        let mut loops = Vec::with_capacity(count);
        for index in 0..count {
            match Loop::spawn(self.config.loop_id(index), settings.clone()) {
                Ok(lp) => loops.push(lp),
                Err(e) => {
                    error!(group = %self.config.group_id, index, error = %e, "Loop 启动失败");
                    for lp in &loops {
                        lp.shutdown();
                    }
                    return Err(e);
                }
            }
        }

        info!(
            group = %self.config.group_id,
            loops = count,
            daemon = self.config.daemon,
            "LoopGroup 已启动"
        );
        LoopGroup::from_loops(self.config.group_id, loops, self.config.daemon)
    }
}

impl Default for LoopGroupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

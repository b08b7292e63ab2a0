//! LoopGroup
//!
//! 一组 Loop 的有序集合，提供轮询、哈希、按 ID 选择以及广播。
//! 成员列表写时复制，`select_next` 读取时不会看到半更新的列表。

use super::builder::LoopGroupBuilder;
use super::future::LoopFuture;
use super::queue::Runnable;
use super::worker::Loop;
use crate::context::LoopContext;
use futures::future::try_join_all;
use orbit_core::{OrbitError, Result};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Loop 池
pub struct LoopGroup {
    id: String,
    members: RwLock<Arc<Vec<Arc<Loop>>>>,
    /// 轮询游标
    cursor: AtomicUsize,
    /// true 时销毁不等待线程退出
    daemon: bool,
}

impl LoopGroup {
    /// 从配置构建
    pub fn builder() -> LoopGroupBuilder {
        LoopGroupBuilder::new()
    }

    /// 由已创建的 Loop 组成分组，ID 重复时失败
    pub fn from_loops(id: impl Into<String>, loops: Vec<Arc<Loop>>, daemon: bool) -> Result<Arc<Self>> {
        let mut seen = HashSet::new();
        if let Some(duplicate) = loops.iter().find(|lp| !seen.insert(lp.id().to_string())) {
            let error = OrbitError::validation(format!("Loop ID 重复: {}", duplicate.id()));
            for lp in &loops {
                lp.shutdown();
            }
            return Err(error);
        }

        let group = Arc::new(Self {
            id: id.into(),
            members: RwLock::new(Arc::new(loops)),
            cursor: AtomicUsize::new(0),
            daemon,
        });
        for lp in group.snapshot().iter() {
            lp.set_group(Arc::downgrade(&group));
        }
        Ok(group)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_daemon(&self) -> bool {
        self.daemon
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    fn snapshot(&self) -> Arc<Vec<Arc<Loop>>> {
        Arc::clone(&self.members.read())
    }

    /// 轮询选择
    pub fn select_next(&self) -> Option<Arc<Loop>> {
        let members = self.snapshot();
        if members.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, AtomicOrdering::Relaxed) % members.len();
        Some(Arc::clone(&members[index]))
    }

    /// 按键哈希选择，成员不变时同一个键总是落到同一个 Loop
    pub fn select_hashing<K: Hash + ?Sized>(&self, key: &K) -> Option<Arc<Loop>> {
        let members = self.snapshot();
        if members.is_empty() {
            return None;
        }
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % members.len() as u64) as usize;
        Some(Arc::clone(&members[index]))
    }

    /// 按 ID 选择
    pub fn select(&self, id: &str) -> Option<Arc<Loop>> {
        self.snapshot().iter().find(|lp| lp.id() == id).cloned()
    }

    /// 全部成员
    pub fn select_all(&self) -> Vec<Arc<Loop>> {
        self.snapshot().as_ref().clone()
    }

    /// 加入新成员
    ///
    /// 插入位置距当前游标恰好一整轮：其余成员各被轮询到一次之后才轮到它。
    pub fn register(self: &Arc<Self>, lp: Arc<Loop>) -> Result<()> {
        let mut members = self.members.write();
        if members.iter().any(|member| member.id() == lp.id()) {
            warn!(group = %self.id, loop_id = %lp.id(), "Loop ID 重复，拒绝加入");
            return Err(OrbitError::validation(format!("Loop ID 重复: {}", lp.id())));
        }

        let n = members.len();
        let cursor = self.cursor.load(AtomicOrdering::Relaxed);
        let position = (cursor % (n + 1) + n) % (n + 1);

        lp.set_group(Arc::downgrade(self));
        let mut next = members.as_ref().clone();
        next.insert(position, lp);
        *members = Arc::new(next);
        info!(group = %self.id, position, size = n + 1, "Loop 已加入分组");
        Ok(())
    }

    /// 在每个成员上计算 `chooser`，按 `comparator` 排序后取前 `limit` 个
    ///
    /// 任一成员失败则整体失败。
    pub fn select_by<T, C, K>(&self, chooser: C, comparator: K, limit: usize) -> LoopFuture<Vec<Arc<Loop>>>
    where
        T: Send + 'static,
        C: Fn(&LoopContext) -> T + Send + Sync + 'static,
        K: Fn(&T, &T) -> Ordering + Send + 'static,
    {
        let members = self.select_all();
        let chooser = Arc::new(chooser);
        let pending: Vec<LoopFuture<T>> = members
            .iter()
            .map(|lp| {
                let chooser = Arc::clone(&chooser);
                lp.submit(move |ctx| chooser(ctx))
            })
            .collect();

        LoopFuture::from_future(async move {
            let values = try_join_all(pending).await?;
            let mut ranked: Vec<(Arc<Loop>, T)> = members.into_iter().zip(values).collect();
            ranked.sort_by(|a, b| comparator(&a.1, &b.1));
            Ok(ranked.into_iter().take(limit).map(|(lp, _)| lp).collect())
        })
    }

    /// 在 `filter` 成立的成员上执行 `f`，结果按成员顺序
    ///
    /// `filter` 在各成员自己的线程上求值。
    pub fn submit_filtered<T, P, F>(&self, filter: P, f: F) -> LoopFuture<Vec<T>>
    where
        T: Send + 'static,
        P: Fn(&LoopContext) -> bool + Send + Sync + 'static,
        F: Fn(&LoopContext) -> T + Send + Sync + 'static,
    {
        let filter = Arc::new(filter);
        let f = Arc::new(f);
        let pending: Vec<LoopFuture<Option<T>>> = self
            .snapshot()
            .iter()
            .map(|lp| {
                let filter = Arc::clone(&filter);
                let f = Arc::clone(&f);
                lp.submit(move |ctx| filter(ctx).then(|| f(ctx)))
            })
            .collect();

        LoopFuture::from_future(async move {
            let results = try_join_all(pending).await?;
            Ok(results.into_iter().flatten().collect())
        })
    }

    /// 在全部成员上执行 `f`
    pub fn submit_all<T, F>(&self, f: F) -> LoopFuture<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(&LoopContext) -> T + Send + Sync + 'static,
    {
        self.submit_filtered(|_| true, f)
    }

    /// 优雅关闭全部成员
    pub fn shutdown(&self) {
        info!(group = %self.id, "LoopGroup 开始关闭");
        for lp in self.snapshot().iter() {
            lp.shutdown();
        }
    }

    /// 立即关闭全部成员，返回各成员未执行的任务
    pub fn shutdown_now(&self) -> Vec<Runnable> {
        self.snapshot()
            .iter()
            .flat_map(|lp| lp.shutdown_now())
            .collect()
    }

    /// 等待全部成员退出，所有成员共享同一个截止时间
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        self.snapshot().iter().all(|lp| {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            lp.await_termination(remaining)
        })
    }

    pub fn is_shutdown(&self) -> bool {
        self.snapshot().iter().all(|lp| lp.is_shutdown())
    }

    pub fn is_terminated(&self) -> bool {
        self.snapshot().iter().all(|lp| lp.is_terminated())
    }
}

impl Drop for LoopGroup {
    fn drop(&mut self) {
        if self.daemon {
            return;
        }
        let members = self.snapshot();
        for lp in members.iter() {
            lp.shutdown();
        }
        for lp in members.iter() {
            lp.join();
        }
    }
}

impl fmt::Debug for LoopGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.snapshot().iter().map(|lp| lp.id().to_string()).collect();
        f.debug_struct("LoopGroup")
            .field("id", &self.id)
            .field("members", &ids)
            .field("daemon", &self.daemon)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LoopSettings;

    fn group(ids: &[&str]) -> Arc<LoopGroup> {
        let loops = ids
            .iter()
            .map(|id| Loop::spawn(*id, LoopSettings::default()).unwrap())
            .collect();
        LoopGroup::from_loops("test", loops, false).unwrap()
    }

    fn next_id(group: &LoopGroup) -> String {
        group.select_next().unwrap().id().to_string()
    }

    #[test]
    fn test_round_robin_wraps() {
        let group = group(&["a", "b", "c"]);
        let picks: Vec<String> = (0..7).map(|_| next_id(&group)).collect();
        assert_eq!(picks, vec!["a", "b", "c", "a", "b", "c", "a"]);
    }

    #[test]
    fn test_hashing_is_stable() {
        let group = group(&["a", "b", "c"]);
        let first = group.select_hashing("player-42").unwrap();
        for _ in 0..10 {
            assert_eq!(group.select_hashing("player-42").unwrap().id(), first.id());
        }
        assert!(group.select("b").is_some());
        assert!(group.select("z").is_none());
        assert_eq!(group.select_all().len(), 3);
    }

    #[test]
    fn test_empty_group_selects_nothing() {
        let group = LoopGroup::from_loops("empty", Vec::new(), false).unwrap();
        assert!(group.is_empty());
        assert!(group.select_next().is_none());
        assert!(group.select_hashing(&1).is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let loops = vec![
            Loop::spawn("dup", LoopSettings::default()).unwrap(),
            Loop::spawn("dup", LoopSettings::default()).unwrap(),
        ];
        assert!(LoopGroup::from_loops("dups", loops, false).is_err());

        let group = group(&["a"]);
        let again = Loop::spawn("a", LoopSettings::default()).unwrap();
        assert!(group.register(Arc::clone(&again)).is_err());
        again.shutdown();
    }

    #[test]
    fn test_register_one_rotation_away() {
        let group = group(&["a", "b", "c"]);
        next_id(&group);

        group
            .register(Loop::spawn("d", LoopSettings::default()).unwrap())
            .unwrap();
        let picks: Vec<String> = (0..4).map(|_| next_id(&group)).collect();
        assert_eq!(&picks[3], "d");
        assert!(!picks[..3].contains(&"d".to_string()));
        assert!(group.select("d").unwrap().group().is_some());
    }

    #[test]
    fn test_select_by_ranks_members() {
        let group = group(&["a", "b", "c"]);
        let weights = [("a", 1), ("b", 5), ("c", 3)];
        let best = group
            .select_by(
                move |ctx| {
                    weights
                        .iter()
                        .find(|(id, _)| *id == ctx.loop_id())
                        .map_or(0, |(_, w)| *w)
                },
                |a: &i32, b: &i32| b.cmp(a),
                2,
            )
            .join()
            .unwrap();
        let ids: Vec<&str> = best.iter().map(|lp| lp.id()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_select_by_fails_when_member_fails() {
        let group = group(&["a", "b"]);
        let result = group
            .select_by(
                |ctx| {
                    if ctx.loop_id() == "b" {
                        panic!("chooser failed");
                    }
                    1
                },
                |a: &i32, b: &i32| a.cmp(b),
                1,
            )
            .join();
        assert!(matches!(result, Err(OrbitError::TaskPanicked(_))));
    }

    #[test]
    fn test_submit_filtered() {
        let group = group(&["a", "b", "c"]);
        let ids = group
            .submit_filtered(|ctx| ctx.loop_id() != "b", |ctx| ctx.loop_id().to_string())
            .join()
            .unwrap();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(group.submit_all(|_| 1).join().unwrap().len(), 3);
    }

    #[test]
    fn test_group_shutdown() {
        let group = group(&["a", "b"]);
        group.shutdown();
        assert!(group.is_shutdown());
        assert!(group.await_termination(Duration::from_secs(5)));
        assert!(group.is_terminated());
        assert!(group.shutdown_now().is_empty());
    }
}

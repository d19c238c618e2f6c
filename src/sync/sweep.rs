//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了键缓存对账：全量列出后端，与缓存比较后增删条目。

use crate::cache::{CacheEntry, KeyCache};
use crate::client::query::{Query, QueryResults};
use crate::client::store::StoreCore;
use crate::error::Result;
use crate::key::Key;
use crate::metrics::GLOBAL_METRICS;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 一次对账的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// 列出的后端对象数
    pub listed: usize,
    /// 新加入缓存的键数
    pub added: usize,
    /// 从缓存移除的键数
    pub removed: usize,
    /// 对账后的缓存大小
    pub cached: usize,
}

/// 执行一次对账
///
/// 先取缓存快照，再完整列出后端：
/// - 快照中有、列表中没有、且快照后未被改写的键被移除
/// - 列表中有、快照中没有、且此刻仍不在缓存中的键以列表给出的大小加入
///
/// 列表失败时缓存保持不变。
///
/// 快照之后写入、又在列表完成之后被删除的键会被列表结果重新加入缓存，
/// `has` 会在下一次对账之前一直报告它存在。
pub(crate) async fn sweep(core: &Arc<StoreCore>, cache: &KeyCache) -> Result<SweepReport> {
    let start = Instant::now();
    let snapshot = cache.snapshot();

    let mut results = QueryResults::new(core.clone(), Query::default().keys_only(true))?;
    let mut listing: HashMap<Key, u64> = HashMap::new();
    while let Some(entry) = results.next().await {
        let entry = entry?;
        listing.insert(entry.key, entry.size);
    }

    let mut removed = 0;
    for (key, stamp) in &snapshot {
        if !listing.contains_key(key) && cache.remove_if_unchanged(key, *stamp) {
            removed += 1;
        }
    }

    let listed = listing.len();
    let mut added = 0;
    for (key, size) in listing {
        if !snapshot.contains_key(&key) && cache.insert_if_absent(key, CacheEntry::Sized(size)) {
            added += 1;
        }
    }

    let report = SweepReport {
        listed,
        added,
        removed,
        cached: cache.len(),
    };
    debug!(
        "KeySweeper: 对账完成, listed={}, added={}, removed={}, cached={}, elapsed={:?}",
        report.listed,
        report.added,
        report.removed,
        report.cached,
        start.elapsed()
    );
    Ok(report)
}

/// 键缓存对账器
///
/// 手动对账与后台对账通过同一把锁串行，任意时刻最多一次对账在进行。
pub struct KeySweeper {
    core: Arc<StoreCore>,
    cache: Arc<KeyCache>,
    gate: Arc<Mutex<()>>,
    cancel: CancellationToken,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl KeySweeper {
    pub(crate) fn new(core: Arc<StoreCore>, cache: Arc<KeyCache>) -> Self {
        Self {
            core,
            cache,
            gate: Arc::new(Mutex::new(())),
            cancel: CancellationToken::new(),
            handle: std::sync::Mutex::new(None),
        }
    }

    async fn run_gated(
        core: &Arc<StoreCore>,
        cache: &KeyCache,
        gate: &Mutex<()>,
    ) -> Result<SweepReport> {
        let _guard = gate.lock().await;
        let result = sweep(core, cache).await;
        match &result {
            Ok(report) => {
                GLOBAL_METRICS.record_sweep(core.store_name(), true);
                GLOBAL_METRICS.set_cache_entries(core.store_name(), report.cached);
            }
            Err(_) => GLOBAL_METRICS.record_sweep(core.store_name(), false),
        }
        result
    }

    /// 立即执行一次对账
    pub async fn sweep_now(&self) -> Result<SweepReport> {
        Self::run_gated(&self.core, &self.cache, &self.gate).await
    }

    /// 启动后台对账任务
    ///
    /// 第一次后台对账发生在一个周期之后；对账失败只记录日志，下一周期重试。
    pub(crate) fn start(&self, interval: Duration) {
        let core = self.core.clone();
        let cache = self.cache.clone();
        let gate = self.gate.clone();
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            info!(
                "KeySweeper: 后台对账已启动, bucket={}, interval={:?}",
                core.store_name(),
                interval
            );
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = Self::run_gated(&core, &cache, &gate) => match result {
                        Ok(report) => debug!(
                            "KeySweeper: 周期对账完成, added={}, removed={}",
                            report.added, report.removed
                        ),
                        Err(e) => warn!("KeySweeper: 周期对账失败，将在下一周期重试: {}", e),
                    },
                }
            }
            info!("KeySweeper: 后台对账已停止, bucket={}", core.store_name());
        });

        let mut slot = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// 通知后台任务退出
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 停止后台任务并等待其退出
    pub(crate) async fn stop(&self) {
        self.cancel.cancel();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("KeySweeper: 后台任务异常退出: {}", e);
                }
            }
        }
    }
}

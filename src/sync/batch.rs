//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了批次：缓冲一组写入和删除，提交时通过有界工作池并发执行。

use super::common::{fail_all, BatchOp};
use super::pool::{Job, JobOutcome, WorkerPool};
use crate::client::store::StoreCore;
use crate::error::{BatchFailure, KeyFailure, Result, StoreError};
use crate::key::Key;
use crate::metrics::GLOBAL_METRICS;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// 批次
///
/// 同一个键只保留最后一次操作。提交时写入每个键一个作业；删除在后端支持批量删除时
/// 按上限切块，每块一个作业，否则每个键一个作业。
/// 部分失败时返回 [`StoreError::PartialBatchFailure`]，列出每个失败的键。
pub struct Batch {
    core: Arc<StoreCore>,
    ops: HashMap<Key, BatchOp>,
}

impl Batch {
    pub(crate) fn new(core: Arc<StoreCore>) -> Self {
        Self {
            core,
            ops: HashMap::new(),
        }
    }

    /// 记录写入，覆盖该键之前的操作
    pub fn put(&mut self, key: Key, value: Vec<u8>) {
        self.ops.insert(key, BatchOp::Put(value));
    }

    /// 记录删除，覆盖该键之前的操作
    pub fn delete(&mut self, key: Key) {
        self.ops.insert(key, BatchOp::Delete);
    }

    /// 该键当前待提交的操作
    pub fn pending(&self, key: &Key) -> Option<&BatchOp> {
        self.ops.get(key)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// 提交批次
    pub async fn commit(self) -> Result<()> {
        self.commit_with(&CancellationToken::new()).await
    }

    /// 提交批次，超过 `timeout` 后取消剩余作业
    pub async fn commit_with_timeout(self, timeout: Duration) -> Result<()> {
        let cancel = CancellationToken::new();
        let timer = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                cancel.cancel();
            })
        };
        let result = self.commit_with(&cancel).await;
        timer.abort();
        result
    }

    /// 提交批次，可通过 `cancel` 取消
    ///
    /// # 参数
    ///
    /// * `cancel` - 取消令牌
    ///
    /// # 返回值
    ///
    /// 全部成功时返回 Ok；否则返回逐键失败列表，取消导致未执行的键同样计入失败
    #[instrument(skip(self, cancel), level = "debug", fields(ops = self.ops.len()))]
    pub async fn commit_with(self, cancel: &CancellationToken) -> Result<()> {
        if self.ops.is_empty() {
            return Ok(());
        }

        let core = self.core;
        let start = Instant::now();

        let mut puts = Vec::new();
        let mut deletes = Vec::new();
        for (key, op) in self.ops {
            match op {
                BatchOp::Put(value) => puts.push((key, value)),
                BatchOp::Delete => deletes.push(key),
            }
        }
        deletes.sort();

        let mut jobs: Vec<Job<Vec<KeyFailure>>> = Vec::new();
        let mut job_keys: Vec<Vec<Key>> = Vec::new();

        let put_count = puts.len();
        for (key, value) in puts {
            let core = core.clone();
            job_keys.push(vec![key.clone()]);
            jobs.push(Box::pin(async move {
                match core.put(&key, value).await {
                    Ok(()) => Vec::new(),
                    Err(error) => vec![KeyFailure {
                        key: key.to_string(),
                        error,
                    }],
                }
            }));
        }

        let delete_count = deletes.len();
        match core.backend.capabilities().max_bulk_delete {
            Some(max) if max > 0 => {
                for chunk in deletes.chunks(max) {
                    let core = core.clone();
                    let keys = chunk.to_vec();
                    job_keys.push(keys.clone());
                    jobs.push(Box::pin(async move { core.delete_chunk(keys).await }));
                }
            }
            _ => {
                for key in deletes {
                    let core = core.clone();
                    job_keys.push(vec![key.clone()]);
                    jobs.push(Box::pin(async move {
                        match core.delete(&key).await {
                            Ok(()) => Vec::new(),
                            Err(error) => vec![KeyFailure {
                                key: key.to_string(),
                                error,
                            }],
                        }
                    }));
                }
            }
        }

        let job_count = jobs.len();
        let pool = WorkerPool::new(core.config.workers);
        debug!(
            "Batch commit: puts={}, deletes={}, jobs={}, workers={}",
            put_count,
            delete_count,
            job_count,
            pool.workers().min(job_count)
        );

        let outcomes = pool.run(jobs, cancel).await;

        let mut failures = Vec::new();
        for (outcome, keys) in outcomes.into_iter().zip(job_keys) {
            match outcome {
                JobOutcome::Completed(job_failures) => failures.extend(job_failures),
                JobOutcome::Cancelled => failures.extend(fail_all(&keys, || {
                    StoreError::Cancelled("batch cancelled before operation started".to_string())
                })),
                JobOutcome::Abandoned => failures.extend(fail_all(&keys, || {
                    StoreError::Cancelled(
                        "batch cancelled while operation was in flight; it may have been applied"
                            .to_string(),
                    )
                })),
                JobOutcome::Lost => failures.extend(fail_all(&keys, || {
                    StoreError::Backend("worker exited without reporting a result".to_string())
                })),
            }
        }

        let total_keys = put_count + delete_count;
        GLOBAL_METRICS.record_batch(
            core.store_name(),
            total_keys.saturating_sub(failures.len()),
            failures.len(),
        );

        if failures.is_empty() {
            info!(
                "Batch commit 完成: {} 个键, {} 个作业, 耗时 {:?}",
                total_keys,
                job_count,
                start.elapsed()
            );
            return Ok(());
        }

        let failure = BatchFailure::new(failures);
        warn!(
            "Batch commit 部分失败: {}/{} 个键失败, keys={:?}",
            failure.len(),
            total_keys,
            failure.keys()
        );
        Err(StoreError::PartialBatchFailure(failure))
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch").field("ops", &self.ops.len()).finish()
    }
}

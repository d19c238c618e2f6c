//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了有界工作池：固定数量的工作任务从共享队列中取出作业并回报结果。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 作业：一个可在工作任务中执行的 future
pub type Job<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// 作业结果
#[derive(Debug)]
pub enum JobOutcome<T> {
    /// 作业执行完成
    Completed(T),
    /// 取消时作业尚未开始
    Cancelled,
    /// 取消时作业正在执行，已被放弃，其效果可能已生效
    Abandoned,
    /// 工作任务异常退出，作业没有回报结果
    Lost,
}

impl<T> JobOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            JobOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

type Queue<T> = Arc<Mutex<mpsc::Receiver<(usize, Job<T>)>>>;

/// 有界工作池
///
/// 每次 [`WorkerPool::run`] 启动 `min(workers, 作业数)` 个工作任务，
/// 全部作业结束（或被取消）后才返回，结果按作业提交顺序排列。
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    /// 创建工作池
    ///
    /// # 参数
    ///
    /// * `workers` - 最大并发工作任务数，最小为 1
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// 执行一组作业
    ///
    /// # 参数
    ///
    /// * `jobs` - 作业列表
    /// * `cancel` - 取消令牌，触发后未开始的作业不再执行，执行中的作业被放弃
    ///
    /// # 返回值
    ///
    /// 与 `jobs` 一一对应的结果
    pub async fn run<T>(&self, jobs: Vec<Job<T>>, cancel: &CancellationToken) -> Vec<JobOutcome<T>>
    where
        T: Send + 'static,
    {
        let total = jobs.len();
        if total == 0 {
            return Vec::new();
        }
        let worker_count = self.workers.min(total);

        let (job_tx, job_rx) = mpsc::channel::<(usize, Job<T>)>(total);
        let (result_tx, mut result_rx) = mpsc::channel::<(usize, JobOutcome<T>)>(total);
        let queue: Queue<T> = Arc::new(Mutex::new(job_rx));

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let queue = queue.clone();
            let results = result_tx.clone();
            let cancel = cancel.clone();
            workers.spawn(worker_loop(worker_id, queue, results, cancel));
        }
        drop(result_tx);

        debug!(
            "WorkerPool: 提交 {} 个作业, 工作任务 {} 个",
            total, worker_count
        );
        for (index, job) in jobs.into_iter().enumerate() {
            if job_tx.send((index, job)).await.is_err() {
                warn!("WorkerPool: 所有工作任务已退出，剩余作业无法提交");
                break;
            }
        }
        drop(job_tx);

        let mut outcomes: Vec<Option<JobOutcome<T>>> = (0..total).map(|_| None).collect();
        while let Some((index, outcome)) = result_rx.recv().await {
            outcomes[index] = Some(outcome);
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!("WorkerPool: 工作任务异常退出: {}", e);
            }
        }

        outcomes
            .into_iter()
            .map(|outcome| outcome.unwrap_or(JobOutcome::Lost))
            .collect()
    }
}

async fn worker_loop<T>(
    worker_id: usize,
    queue: Queue<T>,
    results: mpsc::Sender<(usize, JobOutcome<T>)>,
    cancel: CancellationToken,
) where
    T: Send + 'static,
{
    let mut executed = 0usize;
    loop {
        let next = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        let Some((index, job)) = next else {
            break;
        };

        let outcome = if cancel.is_cancelled() {
            JobOutcome::Cancelled
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => JobOutcome::Abandoned,
                value = job => JobOutcome::Completed(value),
            }
        };
        executed += 1;

        if results.send((index, outcome)).await.is_err() {
            break;
        }
    }
    debug!("WorkerPool: 工作任务 {} 结束, 执行 {} 个作业", worker_id, executed);
}

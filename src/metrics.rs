//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了存储的指标收集功能。

use lazy_static::lazy_static;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{span, Level};

/// 指标收集器
///
/// 用于收集和存储对象存储适配器的运行时指标
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// 后端请求总数
    /// key: "store:op:outcome"
    pub requests_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 后端请求耗时
    /// key: "store:op" -> (total_duration_secs, count)
    pub operation_duration: Arc<Mutex<HashMap<String, (f64, u64)>>>,
    /// 键缓存条目数
    pub cache_entries: Arc<Mutex<HashMap<String, usize>>>,
    /// 对账次数
    /// key: "store:ok|error"
    pub sweeps_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 批量提交的键数
    /// key: "store:ok|failed"
    pub batch_keys_total: Arc<Mutex<HashMap<String, u64>>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Metrics {
    /// 记录请求指标
    ///
    /// # 参数
    ///
    /// * `store` - 存储名称（桶名）
    /// * `op` - 操作类型（get/put/head/delete/delete_many/list）
    /// * `outcome` - 操作结果（ok/not_found/error）
    pub fn record_request(&self, store: &str, op: &str, outcome: &str) {
        let span = span!(Level::TRACE, "store_request", store, op, outcome);
        let _enter = span.enter();
        let key = format!("{}:{}:{}", store, op, outcome);
        *lock(&self.requests_total).entry(key).or_insert(0) += 1;
    }

    /// 记录操作耗时
    pub fn record_duration(&self, store: &str, op: &str, duration_secs: f64) {
        let key = format!("{}:{}", store, op);
        let mut map = lock(&self.operation_duration);
        let entry = map.entry(key).or_insert((0.0, 0));
        entry.0 += duration_secs;
        entry.1 += 1;
    }

    /// 设置键缓存条目数
    pub fn set_cache_entries(&self, store: &str, size: usize) {
        lock(&self.cache_entries).insert(store.to_string(), size);
    }

    /// 记录一次对账
    pub fn record_sweep(&self, store: &str, success: bool) {
        let key = format!("{}:{}", store, if success { "ok" } else { "error" });
        *lock(&self.sweeps_total).entry(key).or_insert(0) += 1;
    }

    /// 记录一次批量提交
    pub fn record_batch(&self, store: &str, succeeded: usize, failed: usize) {
        let mut map = lock(&self.batch_keys_total);
        *map.entry(format!("{}:ok", store)).or_insert(0) += succeeded as u64;
        *map.entry(format!("{}:failed", store)).or_insert(0) += failed as u64;
    }

    /// 读取某个请求计数
    pub fn request_count(&self, store: &str, op: &str, outcome: &str) -> u64 {
        lock(&self.requests_total)
            .get(&format!("{}:{}:{}", store, op, outcome))
            .copied()
            .unwrap_or(0)
    }
}

/// 获取指标字符串
///
/// 将所有指标格式化为文本，按名称排序
///
/// # 返回值
///
/// 返回包含所有指标的字符串
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;
    let mut output = String::new();

    let reqs: BTreeMap<_, _> = lock(&metrics.requests_total).clone().into_iter().collect();
    for (k, v) in reqs {
        let parts: Vec<&str> = k.rsplitn(3, ':').collect();
        if let [outcome, op, store] = parts.as_slice() {
            output.push_str(&format!(
                "blob_requests_total{{store=\"{}\", operation=\"{}\", outcome=\"{}\"}} {}\n",
                store, op, outcome, v
            ));
        }
    }

    let durations: BTreeMap<_, _> = lock(&metrics.operation_duration)
        .clone()
        .into_iter()
        .collect();
    for (k, (total, count)) in durations {
        if let Some((store, op)) = k.rsplit_once(':') {
            output.push_str(&format!(
                "blob_operation_duration_seconds_sum{{store=\"{}\", operation=\"{}\"}} {}\n",
                store, op, total
            ));
            output.push_str(&format!(
                "blob_operation_duration_seconds_count{{store=\"{}\", operation=\"{}\"}} {}\n",
                store, op, count
            ));
        }
    }

    let cache: BTreeMap<_, _> = lock(&metrics.cache_entries).clone().into_iter().collect();
    for (store, size) in cache {
        output.push_str(&format!(
            "blob_key_cache_entries{{store=\"{}\"}} {}\n",
            store, size
        ));
    }

    let sweeps: BTreeMap<_, _> = lock(&metrics.sweeps_total).clone().into_iter().collect();
    for (k, v) in sweeps {
        if let Some((store, outcome)) = k.rsplit_once(':') {
            output.push_str(&format!(
                "blob_sweeps_total{{store=\"{}\", outcome=\"{}\"}} {}\n",
                store, outcome, v
            ));
        }
    }

    let batches: BTreeMap<_, _> = lock(&metrics.batch_keys_total)
        .clone()
        .into_iter()
        .collect();
    for (k, v) in batches {
        if let Some((store, outcome)) = k.rsplit_once(':') {
            output.push_str(&format!(
                "blob_batch_keys_total{{store=\"{}\", outcome=\"{}\"}} {}\n",
                store, outcome, v
            ));
        }
    }
    output
}

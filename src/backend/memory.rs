//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内的内存对象后端。
//!
//! 内存后端按真实对象存储的方式工作：分页列表带续页令牌、对象带代号、
//! 支持批量删除与条件删除。另外提供故障注入、延迟注入和在途调用计数，
//! 用于测试和基准。

use super::{BackendCapabilities, ListPage, ListedObject, ObjectBackend, ObjectMeta};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::debug;

/// 内存后端选项
#[derive(Debug, Clone)]
pub struct MemoryBackendOptions {
    /// 单页列表的最大条目数
    pub max_list_page: usize,
    /// 批量删除单次最大键数，None 表示不支持批量删除
    pub max_bulk_delete: Option<usize>,
    /// 是否支持条件删除
    pub conditional_delete: bool,
    /// 每次调用注入的延迟
    pub latency: Option<Duration>,
}

impl Default for MemoryBackendOptions {
    fn default() -> Self {
        Self {
            max_list_page: 1000,
            max_bulk_delete: Some(1000),
            conditional_delete: true,
            latency: None,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    generation: u64,
}

/// 调用统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub get: u64,
    pub put: u64,
    pub head: u64,
    pub delete: u64,
    pub delete_many: u64,
    pub list: u64,
    /// 观测到的最大并发在途调用数
    pub peak_inflight: usize,
}

#[derive(Debug, Default)]
struct Counters {
    get: AtomicU64,
    put: AtomicU64,
    head: AtomicU64,
    delete: AtomicU64,
    delete_many: AtomicU64,
    list: AtomicU64,
    inflight: AtomicUsize,
    peak_inflight: AtomicUsize,
}

#[derive(Debug, Default)]
struct Faults {
    /// 对这些路径的写入/删除/读取都会失败
    failing_paths: HashSet<String>,
    /// 允许成功的列表调用次数，超过后失败
    list_budget: Option<usize>,
}

/// 在途调用守卫，析构时递减计数
struct InflightGuard<'a> {
    counters: &'a Counters,
}

impl<'a> InflightGuard<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let now = counters.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_inflight.fetch_max(now, Ordering::SeqCst);
        Self { counters }
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.counters.inflight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 内存对象后端
pub struct MemoryBackend {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    next_generation: AtomicU64,
    options: MemoryBackendOptions,
    counters: Counters,
    faults: Mutex<Faults>,
}

impl MemoryBackend {
    /// 使用默认选项创建
    pub fn new() -> Self {
        Self::with_options(MemoryBackendOptions::default())
    }

    pub fn with_options(options: MemoryBackendOptions) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            next_generation: AtomicU64::new(1),
            options,
            counters: Counters::default(),
            faults: Mutex::new(Faults::default()),
        }
    }

    fn read_objects(&self) -> RwLockReadGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_objects(&self) -> RwLockWriteGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.write().unwrap_or_else(|e| e.into_inner())
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 绕过调用统计直接写入对象（模拟带外写入）
    pub fn insert_raw(&self, path: impl Into<String>, data: Vec<u8>) {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        self.write_objects()
            .insert(path.into(), StoredObject { data, generation });
    }

    /// 绕过调用统计直接删除对象（模拟带外删除）
    pub fn remove_raw(&self, path: &str) -> bool {
        self.write_objects().remove(path).is_some()
    }

    /// 绕过调用统计读取对象
    pub fn get_raw(&self, path: &str) -> Option<Vec<u8>> {
        self.read_objects().get(path).map(|o| o.data.clone())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.read_objects().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.read_objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_objects().is_empty()
    }

    /// 所有路径（已排序）
    pub fn paths(&self) -> Vec<String> {
        self.read_objects().keys().cloned().collect()
    }

    /// 让指定路径上的所有操作失败
    pub fn fail_path(&self, path: impl Into<String>) {
        self.faults().failing_paths.insert(path.into());
    }

    /// 前 `pages` 次列表调用成功，之后的列表调用失败
    pub fn fail_list_after(&self, pages: usize) {
        self.faults().list_budget = Some(pages);
    }

    /// 清除所有故障注入
    pub fn clear_faults(&self) {
        let mut faults = self.faults();
        faults.failing_paths.clear();
        faults.list_budget = None;
    }

    /// 调用统计快照
    pub fn stats(&self) -> CallStats {
        let c = &self.counters;
        CallStats {
            get: c.get.load(Ordering::SeqCst),
            put: c.put.load(Ordering::SeqCst),
            head: c.head.load(Ordering::SeqCst),
            delete: c.delete.load(Ordering::SeqCst),
            delete_many: c.delete_many.load(Ordering::SeqCst),
            list: c.list.load(Ordering::SeqCst),
            peak_inflight: c.peak_inflight.load(Ordering::SeqCst),
        }
    }

    /// 当前在途调用数
    pub fn inflight(&self) -> usize {
        self.counters.inflight.load(Ordering::SeqCst)
    }

    /// 重置调用统计
    pub fn reset_stats(&self) {
        let c = &self.counters;
        for counter in [&c.get, &c.put, &c.head, &c.delete, &c.delete_many, &c.list] {
            counter.store(0, Ordering::SeqCst);
        }
        c.peak_inflight
            .store(c.inflight.load(Ordering::SeqCst), Ordering::SeqCst);
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.options.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_path_fault(&self, op: &str, path: &str) -> Result<()> {
        if self.faults().failing_paths.contains(path) {
            debug!("MemoryBackend: injected {} failure, path={}", op, path);
            return Err(StoreError::Backend(format!(
                "injected {} failure for {}",
                op, path
            )));
        }
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("object_count", &self.len())
            .field("options", &self.options)
            .finish()
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            max_list_page: self.options.max_list_page,
            max_bulk_delete: self.options.max_bulk_delete,
            conditional_delete: self.options.conditional_delete,
        }
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        self.counters.get.fetch_add(1, Ordering::SeqCst);
        let _guard = InflightGuard::enter(&self.counters);
        self.simulate_latency().await;
        self.check_path_fault("get", path)?;
        self.read_objects()
            .get(path)
            .map(|o| o.data.clone())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn put(&self, path: &str, value: Vec<u8>) -> Result<()> {
        self.counters.put.fetch_add(1, Ordering::SeqCst);
        let _guard = InflightGuard::enter(&self.counters);
        self.simulate_latency().await;
        self.check_path_fault("put", path)?;
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        self.write_objects().insert(
            path.to_string(),
            StoredObject {
                data: value,
                generation,
            },
        );
        Ok(())
    }

    async fn head(&self, path: &str) -> Result<ObjectMeta> {
        self.counters.head.fetch_add(1, Ordering::SeqCst);
        let _guard = InflightGuard::enter(&self.counters);
        self.simulate_latency().await;
        self.check_path_fault("head", path)?;
        self.read_objects()
            .get(path)
            .map(|o| ObjectMeta {
                size: o.data.len() as u64,
                version: Some(o.generation.to_string()),
            })
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn delete(&self, path: &str, if_version: Option<String>) -> Result<()> {
        self.counters.delete.fetch_add(1, Ordering::SeqCst);
        let _guard = InflightGuard::enter(&self.counters);
        self.simulate_latency().await;
        self.check_path_fault("delete", path)?;

        let mut objects = self.write_objects();
        if let (Some(expected), Some(current)) = (&if_version, objects.get(path)) {
            if !self.options.conditional_delete {
                return Err(StoreError::Validation(
                    "conditional delete is disabled for this backend".to_string(),
                ));
            }
            if current.generation.to_string() != *expected {
                return Err(StoreError::PreconditionFailed(path.to_string()));
            }
        }
        objects.remove(path);
        Ok(())
    }

    async fn delete_many(&self, paths: Vec<String>) -> Result<Vec<(String, StoreError)>> {
        self.counters.delete_many.fetch_add(1, Ordering::SeqCst);
        let _guard = InflightGuard::enter(&self.counters);
        self.simulate_latency().await;

        let max = self.options.max_bulk_delete.ok_or_else(|| {
            StoreError::Validation("bulk delete is disabled for this backend".to_string())
        })?;
        if paths.len() > max {
            return Err(StoreError::Validation(format!(
                "bulk delete of {} keys exceeds the limit of {}",
                paths.len(),
                max
            )));
        }

        let mut failures = Vec::new();
        for path in paths {
            if let Err(e) = self.check_path_fault("delete", &path) {
                failures.push((path, e));
                continue;
            }
            self.write_objects().remove(&path);
        }
        Ok(failures)
    }

    async fn list_page(
        &self,
        prefix: &str,
        token: Option<String>,
        max_keys: usize,
    ) -> Result<ListPage> {
        self.counters.list.fetch_add(1, Ordering::SeqCst);
        let _guard = InflightGuard::enter(&self.counters);
        self.simulate_latency().await;

        {
            let mut faults = self.faults();
            if let Some(budget) = faults.list_budget.as_mut() {
                if *budget == 0 {
                    return Err(StoreError::Backend(
                        "injected list failure".to_string(),
                    ));
                }
                *budget -= 1;
            }
        }

        let page_size = max_keys.clamp(1, self.options.max_list_page);
        let lower = match &token {
            Some(t) if t.as_str() >= prefix => Bound::Excluded(t.clone()),
            _ => Bound::Included(prefix.to_string()),
        };

        let objects = self.read_objects();
        let mut matching = objects
            .range((lower, Bound::Unbounded))
            .take_while(|(path, _)| path.starts_with(prefix));

        let mut page = Vec::with_capacity(page_size.min(objects.len()));
        for (path, object) in matching.by_ref().take(page_size) {
            page.push(ListedObject {
                path: path.clone(),
                size: object.data.len() as u64,
            });
        }
        let has_more = matching.next().is_some();
        let next_token = if has_more {
            page.last().map(|o| o.path.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects: page,
            next_token,
        })
    }
}

//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了对象存储之上的键值存储实现。

use crate::backend::{build_backend, ListPage, ObjectBackend, ObjectMeta};
use crate::cache::{CacheEntry, KeyCache};
use crate::client::query::{PageCursor, Query, QueryResults};
use crate::config::StoreConfig;
use crate::error::{KeyFailure, Result, StoreError};
use crate::key::Key;
use crate::metrics::GLOBAL_METRICS;
use crate::sync::batch::Batch;
use crate::sync::sweep::{KeySweeper, SweepReport};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};

/// 单键操作层
///
/// 负责键与后端路径的互相转换、不存在信号的映射、请求超时、
/// 进程内在途请求上限，以及在修改成功后更新键缓存。
pub(crate) struct StoreCore {
    pub(crate) config: StoreConfig,
    pub(crate) backend: Arc<dyn ObjectBackend>,
    pub(crate) cache: Option<Arc<KeyCache>>,
    limiter: Option<Semaphore>,
    root: String,
}

impl StoreCore {
    pub(crate) fn new(config: StoreConfig, backend: Arc<dyn ObjectBackend>) -> Self {
        let root = config.root_directory.trim_matches('/').to_string();
        let cache = config.cache_keys.then(|| Arc::new(KeyCache::new()));
        let limiter = config.max_inflight_requests.map(Semaphore::new);
        Self {
            config,
            backend,
            cache,
            limiter,
            root,
        }
    }

    pub(crate) fn store_name(&self) -> &str {
        &self.config.bucket
    }

    /// 键 -> 后端路径：与根目录拼接，不以 `/` 开头
    pub(crate) fn path_for(&self, key: &Key) -> String {
        let relative = key.relative();
        match (self.root.is_empty(), relative.is_empty()) {
            (true, _) => relative.to_string(),
            (false, true) => self.root.clone(),
            (false, false) => format!("{}/{}", self.root, relative),
        }
    }

    /// 后端路径 -> 键
    pub(crate) fn key_for(&self, path: &str) -> Key {
        if self.root.is_empty() {
            return Key::new(path);
        }
        let relative = path
            .strip_prefix(self.root.as_str())
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(path);
        Key::new(relative)
    }

    /// 查询前缀 -> 列表前缀
    ///
    /// 前缀按路径段匹配：`/foo` 列出 `/foo/...`，不包含 `/foobar`
    pub(crate) fn list_prefix_for(&self, prefix: &str) -> String {
        let key = Key::new(prefix);
        let path = self.path_for(&key);
        if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        }
    }

    /// 执行一次后端调用
    ///
    /// 依次经过在途请求上限、请求超时和指标记录；不存在错误改写为键的形式
    async fn call<T, F>(&self, op: &'static str, key: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = match &self.limiter {
            Some(limiter) => Some(
                limiter
                    .acquire()
                    .await
                    .map_err(|_| StoreError::Shutdown("request limiter closed".to_string()))?,
            ),
            None => None,
        };

        let start = Instant::now();
        let result = match self.config.request_timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(format!(
                    "{} {} exceeded {}ms",
                    op,
                    key,
                    timeout.as_millis()
                ))),
            },
            None => fut.await,
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(StoreError::NotFound(_)) => "not_found",
            Err(_) => "error",
        };
        GLOBAL_METRICS.record_request(self.store_name(), op, outcome);
        GLOBAL_METRICS.record_duration(self.store_name(), op, start.elapsed().as_secs_f64());
        debug!(
            "StoreCore {}: key={}, outcome={}, elapsed={:?}",
            op,
            key,
            outcome,
            start.elapsed()
        );

        result.map_err(|e| match e {
            StoreError::NotFound(_) => StoreError::NotFound(key.to_string()),
            other => other,
        })
    }

    pub(crate) async fn put(&self, key: &Key, value: Vec<u8>) -> Result<()> {
        let path = self.path_for(key);
        self.call("put", key.as_str(), self.backend.put(&path, value))
            .await?;
        if let Some(cache) = &self.cache {
            cache.put(key.clone(), CacheEntry::Exists);
        }
        Ok(())
    }

    pub(crate) async fn get(&self, key: &Key) -> Result<Vec<u8>> {
        let path = self.path_for(key);
        self.call("get", key.as_str(), self.backend.get(&path)).await
    }

    pub(crate) async fn head(&self, key: &Key) -> Result<ObjectMeta> {
        let path = self.path_for(key);
        self.call("head", key.as_str(), self.backend.head(&path))
            .await
    }

    /// 对象大小
    ///
    /// 启用缓存时只有缓存中已知存在、但大小未知的键才会访问后端
    pub(crate) async fn get_size(&self, key: &Key) -> Result<u64> {
        let Some(cache) = &self.cache else {
            return Ok(self.head(key).await?.size);
        };

        match cache.get(key) {
            None => Err(StoreError::NotFound(key.to_string())),
            Some(CacheEntry::Sized(size)) => Ok(size),
            Some(CacheEntry::Exists) => match self.head(key).await {
                Ok(meta) => {
                    cache.put(key.clone(), CacheEntry::Sized(meta.size));
                    debug!("StoreCore get_size: 缓存键 {} 的大小 {}", key, meta.size);
                    Ok(meta.size)
                }
                Err(e) if e.is_not_found() => {
                    cache.del(key);
                    Err(e)
                }
                Err(e) => Err(e),
            },
        }
    }

    pub(crate) async fn has(&self, key: &Key) -> Result<bool> {
        if let Some(cache) = &self.cache {
            return Ok(cache.has(key));
        }
        match self.head(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 删除单个键，不存在视为成功
    ///
    /// 后端支持条件删除时先读取当前版本，再按该版本删除
    pub(crate) async fn delete(&self, key: &Key) -> Result<()> {
        let path = self.path_for(key);

        let version = if self.backend.capabilities().conditional_delete {
            match self.head(key).await {
                Ok(meta) => meta.version,
                Err(e) if e.is_not_found() => {
                    self.forget(key);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        match self
            .call("delete", key.as_str(), self.backend.delete(&path, version))
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        self.forget(key);
        Ok(())
    }

    /// 批量删除一组键，返回逐键失败
    pub(crate) async fn delete_chunk(&self, keys: Vec<Key>) -> Vec<KeyFailure> {
        let paths: Vec<String> = keys.iter().map(|k| self.path_for(k)).collect();
        let label = format!("{} keys", keys.len());

        let failures = match self
            .call("delete_many", &label, self.backend.delete_many(paths))
            .await
        {
            Ok(failures) => failures,
            Err(e) => {
                let message = e.to_string();
                return keys
                    .into_iter()
                    .map(|key| KeyFailure {
                        key: key.to_string(),
                        error: StoreError::Backend(message.clone()),
                    })
                    .collect();
            }
        };

        let failed: Vec<KeyFailure> = failures
            .into_iter()
            .filter(|(_, error)| !error.is_not_found())
            .map(|(path, error)| KeyFailure {
                key: self.key_for(&path).to_string(),
                error,
            })
            .collect();

        for key in &keys {
            if !failed.iter().any(|f| f.key == key.as_str()) {
                self.forget(key);
            }
        }
        failed
    }

    pub(crate) async fn list_page(
        &self,
        list_prefix: &str,
        token: Option<String>,
        max_keys: usize,
    ) -> Result<ListPage> {
        self.call(
            "list",
            list_prefix,
            self.backend.list_page(list_prefix, token, max_keys),
        )
        .await
    }

    fn forget(&self, key: &Key) {
        if let Some(cache) = &self.cache {
            cache.del(key);
        }
    }
}

/// 对象存储之上的键值存储
///
/// 单键操作直接转发到后端；批量操作通过 [`Batch`] 以有界并发提交；
/// 启用键缓存时，构造阶段会先同步完成一次全量对账，之后由后台任务定期对账。
pub struct BlobStore {
    core: Arc<StoreCore>,
    sweeper: Option<KeySweeper>,
    closed: AtomicBool,
}

impl BlobStore {
    /// 根据配置创建存储
    ///
    /// # 参数
    ///
    /// * `config` - 存储配置
    ///
    /// # 返回值
    ///
    /// 返回新的存储实例；配置无效或初始对账失败时返回错误
    #[instrument(skip(config), level = "info", fields(bucket = %config.bucket, backend = config.backend.name()))]
    pub async fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let backend = build_backend(&config)?;
        Self::with_backend(config, backend).await
    }

    /// 使用指定后端创建存储
    #[instrument(skip(config, backend), level = "info", fields(bucket = %config.bucket))]
    pub async fn with_backend(config: StoreConfig, backend: Arc<dyn ObjectBackend>) -> Result<Self> {
        config.validate()?;

        info!(
            "Initializing BlobStore: backend={}, root={:?}, workers={}, cache_keys={}",
            backend.name(),
            config.root_directory,
            config.workers,
            config.cache_keys
        );

        let interval = config.sweep_interval();
        let core = Arc::new(StoreCore::new(config, backend));

        let sweeper = match &core.cache {
            Some(cache) => {
                let sweeper = KeySweeper::new(core.clone(), cache.clone());
                let report = sweeper.sweep_now().await?;
                info!("BlobStore: 初始键缓存已就绪, {} 个键", report.cached);
                sweeper.start(interval);
                Some(sweeper)
            }
            None => None,
        };

        Ok(Self {
            core,
            sweeper,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Shutdown(format!(
                "store {} is closed",
                self.core.store_name()
            )));
        }
        Ok(())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.core.config
    }

    pub fn backend(&self) -> &Arc<dyn ObjectBackend> {
        &self.core.backend
    }

    /// 键缓存，未启用时为 None
    pub fn key_cache(&self) -> Option<&Arc<KeyCache>> {
        self.core.cache.as_ref()
    }

    /// 写入键值
    #[instrument(skip(self, value), level = "debug", fields(len = value.len()))]
    pub async fn put(&self, key: &Key, value: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        self.core.put(key, value).await
    }

    /// 读取键值，不存在时返回 [`StoreError::NotFound`]
    #[instrument(skip(self), level = "debug")]
    pub async fn get(&self, key: &Key) -> Result<Vec<u8>> {
        self.ensure_open()?;
        self.core.get(key).await
    }

    /// 键是否存在
    #[instrument(skip(self), level = "debug")]
    pub async fn has(&self, key: &Key) -> Result<bool> {
        self.ensure_open()?;
        self.core.has(key).await
    }

    /// 对象大小，不存在时返回 [`StoreError::NotFound`]
    #[instrument(skip(self), level = "debug")]
    pub async fn get_size(&self, key: &Key) -> Result<u64> {
        self.ensure_open()?;
        self.core.get_size(key).await
    }

    /// 删除键，不存在视为成功
    #[instrument(skip(self), level = "debug")]
    pub async fn delete(&self, key: &Key) -> Result<()> {
        self.ensure_open()?;
        self.core.delete(key).await
    }

    /// 按前缀查询
    ///
    /// 过滤器和排序不受支持，会在调用时被拒绝
    pub fn query(&self, query: Query) -> Result<QueryResults> {
        self.ensure_open()?;
        QueryResults::new(self.core.clone(), query)
    }

    /// 从游标处继续一次查询
    pub fn query_from(&self, query: Query, cursor: PageCursor) -> Result<QueryResults> {
        self.ensure_open()?;
        QueryResults::resume(self.core.clone(), query, cursor)
    }

    /// 创建批次
    pub fn batch(&self) -> Result<Batch> {
        self.ensure_open()?;
        Ok(Batch::new(self.core.clone()))
    }

    /// 对象在写入返回后即已持久化，无需额外同步
    pub async fn sync(&self, prefix: &Key) -> Result<()> {
        self.ensure_open()?;
        debug!("BlobStore sync: prefix={} (no-op)", prefix);
        Ok(())
    }

    /// 立即执行一次键缓存对账，与后台对账串行
    pub async fn sweep_now(&self) -> Result<SweepReport> {
        self.ensure_open()?;
        match &self.sweeper {
            Some(sweeper) => sweeper.sweep_now().await,
            None => Err(StoreError::Validation(
                "key cache is disabled for this store".to_string(),
            )),
        }
    }

    /// 关闭存储：停止后台对账并清空键缓存
    #[instrument(skip(self), level = "info", fields(bucket = %self.core.store_name()))]
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(sweeper) = &self.sweeper {
            sweeper.stop().await;
        }
        if let Some(cache) = &self.core.cache {
            cache.clear();
        }
        info!("BlobStore 已关闭");
        Ok(())
    }
}

impl Drop for BlobStore {
    fn drop(&mut self) {
        if let Some(sweeper) = &self.sweeper {
            sweeper.cancel();
        }
    }
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("bucket", &self.core.config.bucket)
            .field("backend", &self.core.backend.name())
            .field("root", &self.core.root)
            .field("cache_keys", &self.core.cache.is_some())
            .finish()
    }
}

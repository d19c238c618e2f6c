//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和设置。

use oxblob::backend::{MemoryBackend, MemoryBackendOptions};
use oxblob::{BlobStore, StoreConfig};
use std::sync::{Arc, Once};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// 生成唯一的桶名，隔离全局指标
#[allow(dead_code)]
pub fn unique_bucket(base: &str) -> String {
    oxblob::utils::generate_unique_name(base)
}

/// 创建内存后端和使用它的存储
///
/// # 参数
///
/// * `config` - 存储配置
/// * `options` - 内存后端选项
#[allow(dead_code)]
pub async fn setup_store(
    config: StoreConfig,
    options: MemoryBackendOptions,
) -> (Arc<MemoryBackend>, BlobStore) {
    setup_logging();
    let backend = Arc::new(MemoryBackend::with_options(options));
    let store = BlobStore::with_backend(config, backend.clone())
        .await
        .expect("failed to create store");
    (backend, store)
}

/// 使用默认后端选项创建存储
#[allow(dead_code)]
pub async fn setup_default_store(base: &str, cache_keys: bool) -> (Arc<MemoryBackend>, BlobStore) {
    let config = StoreConfig::new(unique_bucket(base)).with_cache_keys(cache_keys);
    setup_store(config, MemoryBackendOptions::default()).await
}

/// 以 `/{prefix}/{i:04}` 的形式生成键名
#[allow(dead_code)]
pub fn numbered_key(prefix: &str, i: usize) -> String {
    format!("/{}/{:04}", prefix, i)
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 键缓存与对账集成测试

use crate::common::{numbered_key, setup_default_store, setup_logging, setup_store, unique_bucket};
use oxblob::backend::{MemoryBackend, MemoryBackendOptions};
use oxblob::{BlobStore, CacheEntry, Key, StoreConfig, StoreError};
use std::sync::Arc;
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;

/// 测试构造时的初始对账
#[tokio::test]
async fn test_initial_sweep_populates_cache() {
    setup_logging();
    let backend = Arc::new(MemoryBackend::new());
    backend.insert_raw("pre/a", vec![1, 2, 3]);
    backend.insert_raw("pre/b", vec![]);

    let config = StoreConfig::new(unique_bucket("cache-initial")).with_cache_keys(true);
    let store = BlobStore::with_backend(config, backend.clone()).await.unwrap();
    let cache = store.key_cache().unwrap();

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(&Key::new("/pre/a")), Some(CacheEntry::Sized(3)));
    assert_eq!(cache.get(&Key::new("/pre/b")), Some(CacheEntry::Sized(0)));
}

/// 测试带外删除只有在对账之后才可见
#[tokio::test]
async fn test_out_of_band_delete_visible_after_sweep() {
    let (backend, store) = setup_default_store("cache-oob-delete", true).await;
    let key = Key::new("/k");
    store.put(&key, b"value".to_vec()).await.unwrap();

    assert!(backend.remove_raw("k"));
    assert!(store.has(&key).await.unwrap());

    let report = store.sweep_now().await.unwrap();
    assert_eq!(report.removed, 1);
    assert!(!store.has(&key).await.unwrap());
    assert!(store.get_size(&key).await.unwrap_err().is_not_found());
}

/// 测试带外写入在对账后以列表大小进入缓存
#[tokio::test]
async fn test_out_of_band_put_visible_after_sweep() {
    let (backend, store) = setup_default_store("cache-oob-put", true).await;
    let key = Key::new("/external");
    backend.insert_raw("external", vec![0; 42]);

    assert!(!store.has(&key).await.unwrap());
    let report = store.sweep_now().await.unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.cached, 1);
    assert!(store.has(&key).await.unwrap());

    backend.reset_stats();
    assert_eq!(store.get_size(&key).await.unwrap(), 42);
    assert_eq!(backend.stats().head, 0);
}

/// 测试缓存命中时的 has/get_size 不访问后端
#[tokio::test]
async fn test_cached_lookups_skip_backend() {
    let (backend, store) = setup_default_store("cache-lookups", true).await;
    let key = Key::new("/sized");
    store.put(&key, vec![7; 9]).await.unwrap();
    assert_eq!(
        store.key_cache().unwrap().get(&key),
        Some(CacheEntry::Exists)
    );

    backend.reset_stats();
    assert!(store.has(&key).await.unwrap());
    assert!(!store.has(&Key::new("/absent")).await.unwrap());
    assert!(store.get_size(&Key::new("/absent")).await.is_err());
    assert_eq!(backend.stats().head, 0);

    // 大小未知时读取一次元数据，之后由缓存回答
    assert_eq!(store.get_size(&key).await.unwrap(), 9);
    assert_eq!(store.get_size(&key).await.unwrap(), 9);
    assert_eq!(backend.stats().head, 1);
    assert_eq!(
        store.key_cache().unwrap().get(&key),
        Some(CacheEntry::Sized(9))
    );
}

/// 测试后台对账
#[tokio::test]
async fn test_background_sweep_reconciles_periodically() {
    let config = StoreConfig::new(unique_bucket("cache-background"))
        .with_cache_keys(true)
        .with_sweep_interval_secs(1);
    let (backend, store) = setup_store(config, MemoryBackendOptions::default()).await;

    for i in 0..5 {
        backend.insert_raw(numbered_key("bg", i).trim_start_matches('/'), vec![1]);
    }
    assert!(store.key_cache().unwrap().is_empty());

    let mut reconciled = false;
    for _ in 0..30 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if store.key_cache().unwrap().len() == 5 {
            reconciled = true;
            break;
        }
    }
    assert!(reconciled, "background sweep did not run");
    store.close().await.unwrap();
}

/// 测试对账分页遍历整个桶
#[tokio::test]
async fn test_sweep_walks_every_page() {
    let config = StoreConfig::new(unique_bucket("cache-pages")).with_cache_keys(true);
    let options = MemoryBackendOptions {
        max_list_page: 7,
        ..Default::default()
    };
    let (backend, store) = setup_store(config, options).await;
    for i in 0..50 {
        backend.insert_raw(format!("p/{:04}", i), vec![1]);
    }

    backend.reset_stats();
    let report = store.sweep_now().await.unwrap();
    assert_eq!(report.listed, 50);
    assert_eq!(report.cached, 50);
    assert_eq!(backend.stats().list, 8);
}

/// 测试对账失败时缓存不变
#[tokio::test]
async fn test_failed_sweep_keeps_cache() {
    let (backend, store) = setup_default_store("cache-failed-sweep", true).await;
    store.put(&Key::new("/keep"), b"v".to_vec()).await.unwrap();
    backend.remove_raw("keep");
    backend.fail_list_after(0);

    assert!(store.sweep_now().await.is_err());
    assert!(store.has(&Key::new("/keep")).await.unwrap());

    backend.clear_faults();
    store.sweep_now().await.unwrap();
    assert!(!store.has(&Key::new("/keep")).await.unwrap());
}

/// 测试初始对账失败时构造失败
#[tokio::test]
async fn test_initial_sweep_failure_fails_construction() {
    setup_logging();
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_list_after(0);

    let config = StoreConfig::new(unique_bucket("cache-init-fail")).with_cache_keys(true);
    let err = BlobStore::with_backend(config, backend).await.unwrap_err();
    assert!(matches!(err, StoreError::Backend(_)));
}

/// 测试未启用缓存时手动对账被拒绝
#[tokio::test]
async fn test_sweep_without_cache_is_rejected() {
    let (_backend, store) = setup_default_store("cache-disabled", false).await;
    assert!(store.key_cache().is_none());
    assert!(matches!(
        store.sweep_now().await.unwrap_err(),
        StoreError::Validation(_)
    ));
}

/// 测试对账期间的前台写入不会被撤销
#[tokio::test]
async fn test_concurrent_writes_survive_sweep() {
    let config = StoreConfig::new(unique_bucket("cache-race")).with_cache_keys(true);
    let options = MemoryBackendOptions {
        max_list_page: 5,
        latency: Some(Duration::from_millis(2)),
        ..Default::default()
    };
    let (backend, store) = setup_store(config, options).await;
    for i in 0..40 {
        backend.insert_raw(format!("r/{:04}", i), vec![1]);
    }
    let store = Arc::new(store);

    let sweeper = {
        let store = store.clone();
        tokio::spawn(async move { store.sweep_now().await })
    };
    for i in 0..20 {
        store
            .put(&Key::new(format!("/w/{:04}", i)), vec![2])
            .await
            .unwrap();
    }
    sweeper.await.unwrap().unwrap();

    let cache = store.key_cache().unwrap();
    for i in 0..20 {
        assert!(cache.has(&Key::new(format!("/w/{:04}", i))));
    }
    assert_eq!(cache.len(), 60);
}

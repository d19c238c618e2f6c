//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 并发访问集成测试

use crate::common::{numbered_key, setup_store, unique_bucket};
use oxblob::backend::MemoryBackendOptions;
use oxblob::{Key, Query, StoreConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

#[path = "../common/mod.rs"]
mod common;

/// 测试多个任务并发读写不同的键
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_single_key_operations() {
    let config = StoreConfig::new(unique_bucket("conc-single")).with_cache_keys(true);
    let (backend, store) = setup_store(config, MemoryBackendOptions::default()).await;
    let store = Arc::new(store);

    let mut tasks = JoinSet::new();
    for t in 0..8 {
        let store = store.clone();
        tasks.spawn(async move {
            for i in 0..25 {
                let key = Key::new(format!("/t{}/{:04}", t, i));
                store.put(&key, vec![t as u8; i]).await.unwrap();
                assert_eq!(store.get(&key).await.unwrap().len(), i);
                assert!(store.has(&key).await.unwrap());
                if i % 5 == 0 {
                    store.delete(&key).await.unwrap();
                }
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    assert_eq!(backend.len(), 8 * 20);
    assert_eq!(store.key_cache().unwrap().len(), 8 * 20);
}

/// 测试多个批次并发提交
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_batches() {
    let config = StoreConfig::new(unique_bucket("conc-batches")).with_workers(4);
    let options = MemoryBackendOptions {
        latency: Some(Duration::from_millis(1)),
        ..Default::default()
    };
    let (backend, store) = setup_store(config, options).await;
    let store = Arc::new(store);

    let mut tasks = JoinSet::new();
    for b in 0..6 {
        let store = store.clone();
        tasks.spawn(async move {
            let mut batch = store.batch().unwrap();
            for i in 0..30 {
                batch.put(Key::new(numbered_key(&format!("b{}", b), i)), vec![1]);
            }
            batch.commit().await
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    assert_eq!(backend.len(), 180);
    // 每个批次独立限流，并发批次之间的总并发不超过批次数乘以工作数
    assert!(backend.stats().peak_inflight <= 6 * 4);
}

/// 测试全局在途上限同样约束并发批次
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_global_limit_bounds_concurrent_batches() {
    let config = StoreConfig::new(unique_bucket("conc-global"))
        .with_workers(8)
        .with_max_inflight_requests(3);
    let options = MemoryBackendOptions {
        latency: Some(Duration::from_millis(2)),
        ..Default::default()
    };
    let (backend, store) = setup_store(config, options).await;
    let store = Arc::new(store);

    let mut tasks = JoinSet::new();
    for b in 0..4 {
        let store = store.clone();
        tasks.spawn(async move {
            let mut batch = store.batch().unwrap();
            for i in 0..20 {
                batch.put(Key::new(numbered_key(&format!("g{}", b), i)), vec![1]);
            }
            batch.commit().await
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    assert_eq!(backend.len(), 80);
    assert!(backend.stats().peak_inflight <= 3);
}

/// 测试写入期间并发查询
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queries_during_writes() {
    let config = StoreConfig::new(unique_bucket("conc-query"));
    let options = MemoryBackendOptions {
        max_list_page: 16,
        ..Default::default()
    };
    let (backend, store) = setup_store(config, options).await;
    for i in 0..100 {
        backend.insert_raw(format!("stable/{:04}", i), vec![1]);
    }
    let store = Arc::new(store);

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for i in 0..100 {
                store
                    .put(&Key::new(numbered_key("churn", i)), vec![2])
                    .await
                    .unwrap();
            }
        })
    };

    for _ in 0..5 {
        let stable = store
            .query(Query::with_prefix("/stable").keys_only(true))
            .unwrap()
            .collect_all()
            .await
            .unwrap();
        assert_eq!(stable.len(), 100);
    }
    writer.await.unwrap();
}

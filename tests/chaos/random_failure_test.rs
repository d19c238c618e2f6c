//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 随机故障混沌测试

use crate::common::{numbered_key, setup_store, unique_bucket};
use oxblob::backend::MemoryBackendOptions;
use oxblob::{Key, StoreConfig, StoreError};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;

/// 测试随机路径故障
///
/// 验证批量提交在随机故障下准确报告失败的键，其余键全部生效
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_random_put_failures_are_reported_exactly() {
    let mut rng = rand::thread_rng();
    let config = StoreConfig::new(unique_bucket("chaos-put"))
        .with_workers(rng.gen_range(1..=16))
        .with_cache_keys(true);
    let options = MemoryBackendOptions {
        latency: Some(Duration::from_micros(rng.gen_range(0..500))),
        ..Default::default()
    };
    let (backend, store) = setup_store(config, options).await;

    let total = 300;
    let mut indices: Vec<usize> = (0..total).collect();
    indices.shuffle(&mut rng);
    let failing: BTreeSet<usize> = indices.into_iter().take(rng.gen_range(1..40)).collect();
    for i in &failing {
        backend.fail_path(numbered_key("chaos", *i).trim_start_matches('/'));
    }

    let mut batch = store.batch().unwrap();
    for i in 0..total {
        batch.put(Key::new(numbered_key("chaos", i)), vec![1]);
    }

    let failure = match batch.commit().await {
        Err(StoreError::PartialBatchFailure(failure)) => failure,
        other => panic!("expected partial batch failure, got {:?}", other),
    };

    let expected: Vec<String> = failing.iter().map(|i| numbered_key("chaos", *i)).collect();
    let reported: Vec<String> = failure.keys().into_iter().map(String::from).collect();
    assert_eq!(reported, expected);

    assert_eq!(backend.len(), total - failing.len());
    let cache = store.key_cache().unwrap();
    for i in 0..total {
        assert_eq!(
            cache.has(&Key::new(numbered_key("chaos", i))),
            !failing.contains(&i)
        );
    }
}

/// 测试随机删除故障
#[tokio::test]
async fn test_random_delete_failures_keep_objects() {
    let mut rng = rand::thread_rng();
    let config = StoreConfig::new(unique_bucket("chaos-delete")).with_workers(4);
    let options = MemoryBackendOptions {
        max_bulk_delete: Some(rng.gen_range(10..100)),
        ..Default::default()
    };
    let (backend, store) = setup_store(config, options).await;

    let total = 500;
    for i in 0..total {
        backend.insert_raw(format!("gone/{:04}", i), vec![0]);
    }
    let failing: BTreeSet<usize> = (0..20).map(|_| rng.gen_range(0..total)).collect();
    for i in &failing {
        backend.fail_path(format!("gone/{:04}", i));
    }

    let mut batch = store.batch().unwrap();
    for i in 0..total {
        batch.delete(Key::new(numbered_key("gone", i)));
    }
    match batch.commit().await {
        Err(StoreError::PartialBatchFailure(failure)) => assert_eq!(failure.len(), failing.len()),
        other => panic!("expected partial batch failure, got {:?}", other),
    }

    let remaining: BTreeSet<String> = backend.paths().into_iter().collect();
    let expected: BTreeSet<String> = failing.iter().map(|i| format!("gone/{:04}", i)).collect();
    assert_eq!(remaining, expected);
}

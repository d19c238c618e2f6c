//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 前缀查询集成测试

use crate::common::{numbered_key, setup_default_store, setup_store, unique_bucket};
use futures::StreamExt;
use oxblob::backend::MemoryBackendOptions;
use oxblob::{Filter, Key, Order, Query, StoreConfig, StoreError};

#[path = "../common/mod.rs"]
mod common;

/// 测试 2500 个键分三页列出，每个键恰好出现一次
#[tokio::test]
async fn test_listing_spans_three_pages() {
    let (backend, store) = setup_default_store("query-pages", false).await;
    for i in 0..2500 {
        backend.insert_raw(format!("many/{:04}", i), vec![0; 3]);
    }

    backend.reset_stats();
    let entries = store
        .query(Query::with_prefix("/many").keys_only(true))
        .unwrap()
        .collect_all()
        .await
        .unwrap();

    assert_eq!(entries.len(), 2500);
    assert_eq!(backend.stats().list, 3);
    assert_eq!(backend.stats().get, 0);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.key, Key::new(numbered_key("many", i)));
        assert_eq!(entry.size, 3);
        assert!(entry.value.is_none());
    }
}

/// 测试读取值
#[tokio::test]
async fn test_values_are_fetched_when_requested() {
    let (_backend, store) = setup_default_store("query-values", false).await;
    for i in 0..5 {
        store
            .put(&Key::new(numbered_key("v", i)), format!("value-{}", i).into_bytes())
            .await
            .unwrap();
    }

    let entries = store
        .query(Query::with_prefix("/v"))
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    assert_eq!(entries.len(), 5);
    assert_eq!(entries[2].value.as_deref(), Some(&b"value-2"[..]));
}

/// 测试 limit 与 offset
#[tokio::test]
async fn test_limit_and_offset_across_pages() {
    let config = StoreConfig::new(unique_bucket("query-window"));
    let options = MemoryBackendOptions {
        max_list_page: 10,
        ..Default::default()
    };
    let (backend, store) = setup_store(config, options).await;
    for i in 0..100 {
        backend.insert_raw(format!("w/{:04}", i), vec![1]);
    }

    backend.reset_stats();
    let entries = store
        .query(Query::with_prefix("/w").keys_only(true).offset(25).limit(12))
        .unwrap()
        .collect_all()
        .await
        .unwrap();

    let keys: Vec<Key> = entries.into_iter().map(|e| e.key).collect();
    let expected: Vec<Key> = (25..37).map(|i| Key::new(numbered_key("w", i))).collect();
    assert_eq!(keys, expected);
    // 跳过的条目不读取值，也不会多请求页
    assert_eq!(backend.stats().get, 0);
    assert_eq!(backend.stats().list, 4);
}

/// 测试 offset 超出结果数
#[tokio::test]
async fn test_offset_past_end_yields_nothing() {
    let (backend, store) = setup_default_store("query-past-end", false).await;
    backend.insert_raw("e/1", vec![1]);
    let entries = store
        .query(Query::with_prefix("/e").offset(5))
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    assert!(entries.is_empty());
}

/// 测试前缀按路径段匹配
#[tokio::test]
async fn test_prefix_matches_whole_segments() {
    let (backend, store) = setup_default_store("query-segments", false).await;
    backend.insert_raw("foo/a", vec![1]);
    backend.insert_raw("foo/b/c", vec![1]);
    backend.insert_raw("foobar/x", vec![1]);

    for prefix in ["/foo", "foo", "/foo/"] {
        let keys: Vec<Key> = store
            .query(Query::with_prefix(prefix).keys_only(true))
            .unwrap()
            .collect_all()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec![Key::new("/foo/a"), Key::new("/foo/b/c")]);
    }

    let all = store
        .query(Query::with_prefix("/").keys_only(true))
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
}

/// 测试过滤器和排序被拒绝
#[tokio::test]
async fn test_filters_and_orders_rejected() {
    let (_backend, store) = setup_default_store("query-reject", false).await;

    let err = store
        .query(Query::default().filter(Filter::ValueEquals(vec![1])))
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let err = store
        .query(Query::default().order(Order::KeyDescending))
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

/// 测试列表错误终止序列
#[tokio::test]
async fn test_listing_error_terminates_sequence() {
    let config = StoreConfig::new(unique_bucket("query-error"));
    let options = MemoryBackendOptions {
        max_list_page: 4,
        ..Default::default()
    };
    let (backend, store) = setup_store(config, options).await;
    for i in 0..10 {
        backend.insert_raw(format!("x/{:04}", i), vec![1]);
    }
    backend.fail_list_after(1);

    let mut results = store.query(Query::with_prefix("/x").keys_only(true)).unwrap();
    let mut ok = 0;
    let mut errors = 0;
    while let Some(entry) = results.next().await {
        match entry {
            Ok(_) => ok += 1,
            Err(_) => errors += 1,
        }
    }
    assert_eq!(ok, 4);
    assert_eq!(errors, 1);
    assert!(results.next().await.is_none());
}

/// 测试从游标恢复
#[tokio::test]
async fn test_resume_from_cursor() {
    let config = StoreConfig::new(unique_bucket("query-resume"));
    let options = MemoryBackendOptions {
        max_list_page: 6,
        ..Default::default()
    };
    let (backend, store) = setup_store(config, options).await;
    for i in 0..20 {
        backend.insert_raw(format!("c/{:04}", i), vec![1]);
    }

    let query = Query::with_prefix("/c").keys_only(true).limit(15);
    let mut first = store.query(query.clone()).unwrap();
    for _ in 0..9 {
        first.next().await.unwrap().unwrap();
    }
    let cursor = first.cursor();
    drop(first);

    let rest = store.query_from(query, cursor).unwrap().collect_all().await.unwrap();
    let keys: Vec<Key> = rest.into_iter().map(|e| e.key).collect();
    let expected: Vec<Key> = (9..15).map(|i| Key::new(numbered_key("c", i))).collect();
    assert_eq!(keys, expected);
}

/// 测试带 limit 的查询在大页内中断后恢复
///
/// 单页能容纳全部结果时，恢复后重新取回的页不能比原来的页短
#[tokio::test]
async fn test_resume_with_limit_inside_large_page() {
    let config = StoreConfig::new(unique_bucket("query-resume-large"));
    let options = MemoryBackendOptions {
        max_list_page: 100,
        ..Default::default()
    };
    let (backend, store) = setup_store(config, options).await;
    for i in 0..20 {
        backend.insert_raw(format!("c/{:04}", i), vec![1]);
    }

    let query = Query::with_prefix("/c").keys_only(true).limit(10);
    let mut first = store.query(query.clone()).unwrap();
    let mut keys = Vec::new();
    for _ in 0..6 {
        keys.push(first.next().await.unwrap().unwrap().key);
    }
    let cursor = first.cursor();
    drop(first);

    let rest = store.query_from(query, cursor).unwrap().collect_all().await.unwrap();
    keys.extend(rest.into_iter().map(|e| e.key));
    let expected: Vec<Key> = (0..10).map(|i| Key::new(numbered_key("c", i))).collect();
    assert_eq!(keys, expected);
}

/// 测试异步流接口
#[tokio::test]
async fn test_results_as_stream() {
    let (backend, store) = setup_default_store("query-stream", false).await;
    for i in 0..8 {
        backend.insert_raw(format!("s/{:04}", i), vec![0; i]);
    }

    let sizes: Vec<u64> = store
        .query(Query::with_prefix("/s").keys_only(true))
        .unwrap()
        .into_stream()
        .map(|entry| entry.unwrap().size)
        .collect()
        .await;
    assert_eq!(sizes, (0..8).collect::<Vec<u64>>());
}

/// 测试列出后被删除的键在读取值时被跳过
#[tokio::test]
async fn test_entry_deleted_after_listing_is_skipped() {
    let config = StoreConfig::new(unique_bucket("query-vanish"));
    let options = MemoryBackendOptions {
        max_list_page: 10,
        ..Default::default()
    };
    let (backend, store) = setup_store(config, options).await;
    for i in 0..3 {
        backend.insert_raw(format!("d/{:04}", i), vec![1]);
    }

    let mut results = store.query(Query::with_prefix("/d")).unwrap();
    let first = results.next().await.unwrap().unwrap();
    assert_eq!(first.key, Key::new("/d/0000"));

    backend.remove_raw("d/0001");
    let rest: Vec<Key> = results
        .collect_all()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.key)
        .collect();
    assert_eq!(rest, vec![Key::new("/d/0002")]);
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了键值存储的接口和实现。

pub mod query;
pub mod store;

use crate::error::Result;
use crate::key::Key;
use crate::sync::batch::Batch;
use async_trait::async_trait;
use query::{Query, QueryResults};

pub use store::BlobStore;

/// 键值存储特征
///
/// 上层数据存储通过该特征使用对象存储。所有方法都可以并发调用。
#[async_trait]
pub trait KvStore: Send + Sync {
    /// 写入键值
    async fn put(&self, key: &Key, value: Vec<u8>) -> Result<()>;

    /// 读取键值，不存在时返回 NotFound 错误
    async fn get(&self, key: &Key) -> Result<Vec<u8>>;

    /// 键是否存在
    async fn has(&self, key: &Key) -> Result<bool>;

    /// 对象大小
    async fn get_size(&self, key: &Key) -> Result<u64>;

    /// 删除键，不存在视为成功
    async fn delete(&self, key: &Key) -> Result<()>;

    /// 按前缀查询
    fn query(&self, query: Query) -> Result<QueryResults>;

    /// 创建批次
    fn batch(&self) -> Result<Batch>;

    /// 将前缀下的写入持久化
    async fn sync(&self, prefix: &Key) -> Result<()>;

    /// 关闭存储
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl KvStore for BlobStore {
    async fn put(&self, key: &Key, value: Vec<u8>) -> Result<()> {
        BlobStore::put(self, key, value).await
    }

    async fn get(&self, key: &Key) -> Result<Vec<u8>> {
        BlobStore::get(self, key).await
    }

    async fn has(&self, key: &Key) -> Result<bool> {
        BlobStore::has(self, key).await
    }

    async fn get_size(&self, key: &Key) -> Result<u64> {
        BlobStore::get_size(self, key).await
    }

    async fn delete(&self, key: &Key) -> Result<()> {
        BlobStore::delete(self, key).await
    }

    fn query(&self, query: Query) -> Result<QueryResults> {
        BlobStore::query(self, query)
    }

    fn batch(&self) -> Result<Batch> {
        BlobStore::batch(self)
    }

    async fn sync(&self, prefix: &Key) -> Result<()> {
        BlobStore::sync(self, prefix).await
    }

    async fn close(&self) -> Result<()> {
        BlobStore::close(self).await
    }
}

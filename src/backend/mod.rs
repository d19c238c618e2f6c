//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了远端对象存储后端的抽象，以及内存后端和基于 object_store 的远端后端。
//!
//! 后端只处理后端路径（已拼接根目录、不以 `/` 开头），键与路径之间的转换由
//! 存储层负责。

pub mod memory;
pub mod remote;

use crate::config::{BackendConfig, StoreConfig};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use std::sync::Arc;

pub use memory::{CallStats, MemoryBackend, MemoryBackendOptions};
pub use remote::RemoteBackend;

/// 对象元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// 对象大小（字节）
    pub size: u64,
    /// 后端版本/代号，用于条件删除
    pub version: Option<String>,
}

/// 列表中的一个对象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    /// 后端路径
    pub path: String,
    /// 对象大小（字节）
    pub size: u64,
}

/// 一页列表结果
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ListedObject>,
    /// 续页令牌，None 表示已经是最后一页
    pub next_token: Option<String>,
}

/// 后端能力
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// 单页列表的最大条目数
    pub max_list_page: usize,
    /// 批量删除单次调用的最大键数，None 表示不支持批量删除
    pub max_bulk_delete: Option<usize>,
    /// 是否支持基于版本的条件删除
    pub conditional_delete: bool,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self {
            max_list_page: 1000,
            max_bulk_delete: Some(1000),
            conditional_delete: false,
        }
    }
}

/// 对象存储后端特征
///
/// 单对象原语。实现方负责将自身的"不存在"信号映射为 [`StoreError::NotFound`]，
/// 删除不存在的对象必须返回成功。
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// 后端名称，用于日志和指标
    fn name(&self) -> &str;

    /// 后端能力
    fn capabilities(&self) -> BackendCapabilities;

    /// 读取对象内容
    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// 写入（覆盖）对象
    async fn put(&self, path: &str, value: Vec<u8>) -> Result<()>;

    /// 读取对象元数据
    async fn head(&self, path: &str) -> Result<ObjectMeta>;

    /// 删除对象；`if_version` 不为空时仅在版本匹配时删除
    async fn delete(&self, path: &str, if_version: Option<String>) -> Result<()>;

    /// 批量删除，返回逐路径的失败列表
    ///
    /// 不存在的路径不算失败
    async fn delete_many(&self, paths: Vec<String>) -> Result<Vec<(String, StoreError)>> {
        let _ = paths;
        Err(StoreError::Validation(format!(
            "backend {} does not support bulk delete",
            self.name()
        )))
    }

    /// 列出一页以 `prefix` 开头的对象
    async fn list_page(
        &self,
        prefix: &str,
        token: Option<String>,
        max_keys: usize,
    ) -> Result<ListPage>;
}

/// 根据配置构建后端
pub fn build_backend(config: &StoreConfig) -> Result<Arc<dyn ObjectBackend>> {
    match &config.backend {
        BackendConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendConfig::S3(s3) => Ok(Arc::new(RemoteBackend::s3(config, s3)?)),
        BackendConfig::Gcs(gcs) => Ok(Arc::new(RemoteBackend::gcs(config, gcs)?)),
    }
}

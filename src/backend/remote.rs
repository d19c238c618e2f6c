//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于 `object_store` 的远端后端，支持 S3（及兼容服务）和 GCS。

use super::{BackendCapabilities, ListPage, ListedObject, ObjectBackend, ObjectMeta};
use crate::config::{GcsConfig, S3Config, StoreConfig};
use crate::error::{ConfigErrors, ConfigIssue, Result, StoreError};
use crate::utils::redaction::{redact_endpoint, redact_value};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{ClientOptions, ObjectStore};
use secrecy::ExposeSecret;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// S3 单次列表请求的上限
pub const S3_LIST_MAX: usize = 1000;
/// S3 单次批量删除请求的上限
pub const S3_DELETE_MAX: usize = 1000;

/// 基于 `object_store` 的远端后端
///
/// 续页令牌是上一页最后一个路径，下一页从它之后开始列出。
pub struct RemoteBackend {
    store: Arc<dyn ObjectStore>,
    name: String,
    max_list_page: usize,
}

impl RemoteBackend {
    /// 包装任意 `ObjectStore` 实现
    pub fn new(store: Arc<dyn ObjectStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            max_list_page: S3_LIST_MAX,
        }
    }

    /// 设置单页列表上限
    pub fn with_max_list_page(mut self, max: usize) -> Self {
        self.max_list_page = max.max(1);
        self
    }

    /// 构建 S3 后端
    #[instrument(skip(config, s3), level = "info", fields(bucket = %config.bucket))]
    pub fn s3(config: &StoreConfig, s3: &S3Config) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_region(&s3.region);

        if let Some(endpoint) = &s3.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false);
        }
        if s3.allow_http {
            builder = builder.with_allow_http(true);
        }
        if let Some(access_key_id) = &s3.access_key_id {
            builder = builder.with_access_key_id(access_key_id);
        }
        if let Some(secret) = &s3.secret_access_key {
            builder = builder.with_secret_access_key(secret.expose_secret());
        }
        if let Some(token) = &s3.session_token {
            builder = builder.with_token(token.expose_secret());
        }
        if let Some(options) = client_options(config) {
            builder = builder.with_client_options(options);
        }

        let store = builder.build().map_err(|e| build_error("s3", e))?;
        info!(
            "RemoteBackend: S3 后端已创建, region={}, endpoint={:?}, access_key_id={:?}",
            s3.region,
            s3.endpoint.as_deref().map(redact_endpoint),
            s3.access_key_id.as_deref().map(|id| redact_value(id, 4))
        );
        Ok(Self::new(Arc::new(store), "s3"))
    }

    /// 构建 GCS 后端
    #[instrument(skip(config, gcs), level = "info", fields(bucket = %config.bucket))]
    pub fn gcs(config: &StoreConfig, gcs: &GcsConfig) -> Result<Self> {
        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(&config.bucket);

        if let Some(path) = &gcs.service_account_path {
            builder = builder.with_service_account_path(path);
        }
        if let Some(options) = client_options(config) {
            builder = builder.with_client_options(options);
        }

        let store = builder.build().map_err(|e| build_error("gcs", e))?;
        info!("RemoteBackend: GCS 后端已创建");
        Ok(Self::new(Arc::new(store), "gcs"))
    }
}

fn client_options(config: &StoreConfig) -> Option<ClientOptions> {
    config
        .request_timeout()
        .map(|timeout| ClientOptions::new().with_timeout(timeout))
}

fn build_error(backend: &str, e: object_store::Error) -> StoreError {
    StoreError::Config(ConfigErrors(vec![ConfigIssue::BackendBuild(
        backend.to_string(),
        e.to_string(),
    )]))
}

/// 将 `object_store` 错误映射为存储错误
fn map_error(path: &str, e: object_store::Error) -> StoreError {
    match e {
        object_store::Error::NotFound { .. } => StoreError::NotFound(path.to_string()),
        object_store::Error::Precondition { .. } => {
            StoreError::PreconditionFailed(path.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

fn object_path(path: &str) -> ObjectPath {
    ObjectPath::from(path)
}

impl std::fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("name", &self.name)
            .field("store", &self.store.to_string())
            .finish()
    }
}

#[async_trait]
impl ObjectBackend for RemoteBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            max_list_page: self.max_list_page,
            max_bulk_delete: Some(S3_DELETE_MAX),
            conditional_delete: false,
        }
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let result = self
            .store
            .get(&object_path(path))
            .await
            .map_err(|e| map_error(path, e))?;
        let bytes = result.bytes().await.map_err(|e| map_error(path, e))?;
        Ok(bytes.to_vec())
    }

    async fn put(&self, path: &str, value: Vec<u8>) -> Result<()> {
        self.store
            .put(&object_path(path), value.into())
            .await
            .map_err(|e| map_error(path, e))?;
        Ok(())
    }

    async fn head(&self, path: &str) -> Result<ObjectMeta> {
        let meta = self
            .store
            .head(&object_path(path))
            .await
            .map_err(|e| map_error(path, e))?;
        Ok(ObjectMeta {
            size: meta.size as u64,
            version: meta.version.or(meta.e_tag),
        })
    }

    async fn delete(&self, path: &str, if_version: Option<String>) -> Result<()> {
        if if_version.is_some() {
            return Err(StoreError::Validation(format!(
                "backend {} does not support conditional delete",
                self.name
            )));
        }
        match self.store.delete(&object_path(path)).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(map_error(path, e)),
        }
    }

    async fn delete_many(&self, paths: Vec<String>) -> Result<Vec<(String, StoreError)>> {
        let locations = stream::iter(
            paths
                .iter()
                .map(|p| Ok::<_, object_store::Error>(object_path(p))),
        )
        .boxed();
        let results: Vec<_> = self.store.delete_stream(locations).collect().await;

        let mut deleted: HashSet<String> = HashSet::new();
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(location) => {
                    deleted.insert(location.to_string());
                }
                Err(object_store::Error::NotFound { path, .. }) => {
                    deleted.insert(path);
                }
                Err(e) => errors.push(e.to_string()),
            }
        }

        if errors.is_empty() {
            return Ok(Vec::new());
        }

        // 批量删除的错误不一定携带路径，未确认删除的路径共享同一组错误信息
        let message = errors.join("; ");
        debug!(
            "RemoteBackend: 批量删除部分失败, backend={}, errors={}",
            self.name, message
        );
        Ok(paths
            .into_iter()
            .filter(|p| !deleted.contains(p.as_str()))
            .map(|p| (p, StoreError::Backend(message.clone())))
            .collect())
    }

    async fn list_page(
        &self,
        prefix: &str,
        token: Option<String>,
        max_keys: usize,
    ) -> Result<ListPage> {
        let page_size = max_keys.clamp(1, self.max_list_page);
        let prefix_path = if prefix.is_empty() {
            None
        } else {
            Some(object_path(prefix))
        };

        let mut listing = match &token {
            Some(offset) => self
                .store
                .list_with_offset(prefix_path.as_ref(), &object_path(offset)),
            None => self.store.list(prefix_path.as_ref()),
        };

        // 每页最多从列表流读取 page_size 项，不预读
        let mut objects = Vec::with_capacity(page_size);
        while objects.len() < page_size {
            let Some(item) = listing.next().await else {
                break;
            };
            let meta = item.map_err(|e| map_error(prefix, e))?;
            objects.push(ListedObject {
                path: meta.location.to_string(),
                size: meta.size as u64,
            });
        }

        // 满页即返回续页令牌，末尾可能多一次空页
        let next_token = if objects.len() == page_size {
            objects.last().map(|o: &ListedObject| o.path.clone())
        } else {
            None
        };
        Ok(ListPage {
            objects,
            next_token,
        })
    }
}

//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了存储系统的配置结构和校验逻辑。

use crate::error::{ConfigErrors, ConfigIssue, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 默认批量提交工作者数量
pub const DEFAULT_WORKERS: usize = 100;
/// 工作者数量上限
pub const MAX_WORKERS: usize = 10_000;
/// 默认键缓存扫描间隔（秒）
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
/// 扫描间隔上限（秒）
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 86_400;
/// 单次请求超时上限（毫秒）
pub const MAX_REQUEST_TIMEOUT_MS: u64 = 600_000;

/// 存储配置
///
/// 构造存储时校验一次，之后不可变
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct StoreConfig {
    /// 桶/容器名称
    pub bucket: String,
    /// 所有键共享的根路径前缀，空字符串表示不加前缀
    pub root_directory: String,
    /// 批量提交的工作者数量
    pub workers: usize,
    /// 是否启用本地键缓存
    pub cache_keys: bool,
    /// 键缓存扫描间隔（秒）
    pub sweep_interval_secs: u64,
    /// 单次后端请求超时（毫秒），None 表示不限制
    pub request_timeout_ms: Option<u64>,
    /// 进程内所有批次共享的在途请求上限，None 表示不限制
    pub max_inflight_requests: Option<usize>,
    /// 后端配置
    pub backend: BackendConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            root_directory: String::new(),
            workers: DEFAULT_WORKERS,
            cache_keys: false,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            request_timeout_ms: None,
            max_inflight_requests: None,
            backend: BackendConfig::default(),
        }
    }
}

/// 后端类型
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// 进程内存储，用于嵌入和测试
    #[default]
    Memory,
    /// Amazon S3 或兼容 S3 的服务
    S3(S3Config),
    /// Google Cloud Storage
    Gcs(GcsConfig),
}

impl BackendConfig {
    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::Memory => "memory",
            BackendConfig::S3(_) => "s3",
            BackendConfig::Gcs(_) => "gcs",
        }
    }
}

/// S3 后端配置
///
/// 静态凭证原样透传给客户端构建器；凭证的获取与刷新不属于本库
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct S3Config {
    /// 区域
    pub region: String,
    /// 自定义端点（如 MinIO），设置后使用 path-style 请求
    pub endpoint: Option<String>,
    /// 是否允许 HTTP
    pub allow_http: bool,
    /// 访问密钥 ID
    pub access_key_id: Option<String>,
    /// 访问密钥
    pub secret_access_key: Option<SecretString>,
    /// 会话令牌
    pub session_token: Option<SecretString>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: None,
            allow_http: false,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
        }
    }
}

/// GCS 后端配置
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct GcsConfig {
    /// 服务账号 JSON 文件路径，未设置时从环境读取
    pub service_account_path: Option<String>,
}

impl StoreConfig {
    /// 以默认值创建指定桶的配置
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    pub fn with_root_directory(mut self, root: impl Into<String>) -> Self {
        self.root_directory = root.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_cache_keys(mut self, enabled: bool) -> Self {
        self.cache_keys = enabled;
        self
    }

    pub fn with_sweep_interval_secs(mut self, secs: u64) -> Self {
        self.sweep_interval_secs = secs;
        self
    }

    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = Some(ms);
        self
    }

    pub fn with_max_inflight_requests(mut self, limit: usize) -> Self {
        self.max_inflight_requests = Some(limit);
        self
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    /// 从 TOML 字符串加载配置（不做校验）
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 从 TOML 文件加载配置（不做校验）
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// 验证配置
    ///
    /// 收集所有问题后一次性返回
    pub fn validate(&self) -> std::result::Result<(), ConfigErrors> {
        let mut issues = Vec::new();

        if self.bucket.is_empty() {
            issues.push(ConfigIssue::EmptyBucket);
        } else if self.bucket.len() > 255 || self.bucket.contains('/') {
            issues.push(ConfigIssue::InvalidBucket(self.bucket.clone()));
        }

        if self.root_directory.split('/').any(|segment| segment == "..") {
            issues.push(ConfigIssue::InvalidRootDirectory(
                self.root_directory.clone(),
            ));
        }

        if self.workers == 0 || self.workers > MAX_WORKERS {
            issues.push(ConfigIssue::WorkersOutOfRange {
                got: self.workers,
                max: MAX_WORKERS,
            });
        }

        if self.sweep_interval_secs == 0 || self.sweep_interval_secs > MAX_SWEEP_INTERVAL_SECS {
            issues.push(ConfigIssue::SweepIntervalOutOfRange {
                got: self.sweep_interval_secs,
                max: MAX_SWEEP_INTERVAL_SECS,
            });
        }

        if let Some(timeout) = self.request_timeout_ms {
            if timeout == 0 || timeout > MAX_REQUEST_TIMEOUT_MS {
                issues.push(ConfigIssue::RequestTimeoutOutOfRange {
                    got: timeout,
                    max: MAX_REQUEST_TIMEOUT_MS,
                });
            }
        }

        if self.max_inflight_requests == Some(0) {
            issues.push(ConfigIssue::ZeroInflightLimit);
        }

        if let BackendConfig::S3(s3) = &self.backend {
            if s3.region.trim().is_empty() {
                issues.push(ConfigIssue::EmptyRegion);
            }
            if let Some(endpoint) = &s3.endpoint {
                if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                    issues.push(ConfigIssue::InvalidEndpoint(endpoint.clone()));
                }
            }
            if s3.access_key_id.is_some() != s3.secret_access_key.is_some() {
                issues.push(ConfigIssue::IncompleteStaticCredentials);
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigErrors(issues))
        }
    }
}

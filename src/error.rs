//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了存储系统的错误类型和批量提交的聚合错误。

use std::fmt;
use thiserror::Error;

/// 存储系统错误类型枚举
///
/// 定义了单键操作、查询、批量提交和配置加载中可能发生的各种错误
#[derive(Error, Debug)]
pub enum StoreError {
    /// 键不存在
    #[error("key not found: {0}")]
    NotFound(String),

    /// 后端调用失败（网络或服务端错误，本层不重试）
    #[error("Backend error: {0}")]
    Backend(String),

    /// 单次后端请求超时
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// 条件删除的前置条件不满足（对象已被并发修改）
    #[error("precondition failed for key: {0}")]
    PreconditionFailed(String),

    /// 作业在开始执行前被取消
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// 参数校验失败（如不支持的过滤器或排序）
    #[error("Validation error: {0}")]
    Validation(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(ConfigErrors),

    /// 批量提交部分失败
    #[error("{0}")]
    PartialBatchFailure(BatchFailure),

    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML解析错误
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// 存储已关闭
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

impl StoreError {
    /// 是否为键不存在错误
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// 单条配置问题
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssue {
    #[error("bucket must not be empty")]
    EmptyBucket,

    #[error("bucket '{0}' is invalid: must be at most 255 characters and contain no '/'")]
    InvalidBucket(String),

    #[error("root_directory '{0}' must not contain '..' segments")]
    InvalidRootDirectory(String),

    #[error("workers must be between 1 and {max}, got {got}")]
    WorkersOutOfRange { got: usize, max: usize },

    #[error("sweep_interval_secs must be between 1 and {max}, got {got}")]
    SweepIntervalOutOfRange { got: u64, max: u64 },

    #[error("request_timeout_ms must be between 1 and {max}, got {got}")]
    RequestTimeoutOutOfRange { got: u64, max: u64 },

    #[error("max_inflight_requests must be at least 1")]
    ZeroInflightLimit,

    #[error("s3 region must not be empty")]
    EmptyRegion,

    #[error("endpoint '{0}' must start with http:// or https://")]
    InvalidEndpoint(String),

    #[error("access_key_id and secret_access_key must be set together")]
    IncompleteStaticCredentials,

    #[error("backend '{0}' could not be built: {1}")]
    BackendBuild(String, String),
}

/// 配置校验结果：列出全部问题，而不是只报告第一个
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigErrors(pub Vec<ConfigIssue>);

impl ConfigErrors {
    /// 全部问题
    pub fn issues(&self) -> &[ConfigIssue] {
        &self.0
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|issue| issue.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl From<ConfigErrors> for StoreError {
    fn from(errors: ConfigErrors) -> Self {
        StoreError::Config(errors)
    }
}

/// 批量提交中单个键的失败
#[derive(Debug)]
pub struct KeyFailure {
    /// 失败的键
    pub key: String,
    /// 底层错误
    pub error: StoreError,
}

/// 批量提交的聚合错误
///
/// 一次提交中所有失败作业的逐键列表。提交不是原子的：
/// 未出现在此列表中的操作均已生效。
#[derive(Debug, Default)]
pub struct BatchFailure {
    failures: Vec<KeyFailure>,
}

impl BatchFailure {
    pub fn new(mut failures: Vec<KeyFailure>) -> Self {
        failures.sort_by(|a, b| a.key.cmp(&b.key));
        Self { failures }
    }

    /// 所有失败条目
    pub fn failures(&self) -> &[KeyFailure] {
        &self.failures
    }

    /// 失败的键（已排序）
    pub fn keys(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.key.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed batch operation ({} keys):", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  {}: {}", failure.key, failure.error)?;
        }
        Ok(())
    }
}

/// 存储操作结果类型别名
pub type Result<T> = std::result::Result<T, StoreError>;

//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 统一工具模块
//!
//! 提供命令行、测试和基准共用的工具函数，包括：
//! - 日志设置工具
//! - 存储名称生成工具

pub mod redaction;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// 初始化日志，只生效一次
///
/// 过滤规则读取 `RUST_LOG`，未设置时为 `default_filter`
pub fn setup_logging_with(default_filter: &str) {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
            .ok();
    });
}

pub fn setup_logging() {
    setup_logging_with("info");
}

static NAME_SEQ: AtomicU64 = AtomicU64::new(0);

/// 生成唯一的存储名称，用于隔离全局指标
pub fn generate_unique_name(base: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let seq = NAME_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{:x}", base, std::process::id(), (nanos as u64) << 16 | seq)
}

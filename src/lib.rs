//! oxblob - 对象存储键值适配器
//!
//! 在 S3、GCS 等远端对象存储之上提供层级键的键值存储：
//! 有界并发的批量提交与逐键失败汇总、可选的本地键缓存及其周期对账、
//! 以及按前缀的惰性分页查询。

#![doc(html_root_url = "https://docs.rs/oxblob/0.1.0")]

pub use tokio;

pub mod backend;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod key;
pub mod metrics;
pub mod sync;
pub mod utils;

// Re-export commonly used items
pub use backend::{MemoryBackend, ObjectBackend, RemoteBackend};
pub use cache::{CacheEntry, KeyCache};
pub use client::query::{Entry, Filter, Order, PageCursor, Query, QueryResults};
pub use client::{BlobStore, KvStore};
pub use config::{BackendConfig, StoreConfig};
pub use error::{BatchFailure, KeyFailure, Result, StoreError};
pub use key::Key;
pub use sync::batch::Batch;
pub use sync::sweep::SweepReport;

/// oxblob 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

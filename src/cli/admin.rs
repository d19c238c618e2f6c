//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了管理命令的实现。

use super::SweepArgs;
use crate::client::BlobStore;
use anyhow::{Context, Result};

pub async fn execute_sweep(store: &BlobStore, args: &SweepArgs) -> Result<()> {
    let report = store
        .sweep_now()
        .await
        .context("Key cache sweep failed (is cache_keys enabled?)")?;

    if args.json {
        let output = serde_json::json!({
            "bucket": store.config().bucket,
            "listed": report.listed,
            "added": report.added,
            "removed": report.removed,
            "cached": report.cached,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("=== Key Cache Sweep: {} ===", store.config().bucket);
        println!("Listed:  {}", report.listed);
        println!("Added:   {}", report.added);
        println!("Removed: {}", report.removed);
        println!("Cached:  {}", report.cached);
    }
    Ok(())
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了列表命令的实现。

use super::LsArgs;
use crate::client::query::Query;
use crate::client::BlobStore;
use anyhow::Result;
use serde::Serialize;

#[derive(Serialize)]
struct ListedEntry {
    key: String,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

pub async fn execute(store: &BlobStore, args: &LsArgs) -> Result<()> {
    let query = Query::with_prefix(&args.prefix)
        .keys_only(!args.values)
        .limit(args.limit)
        .offset(args.offset);
    let mut results = store.query(query)?;

    let mut count = 0usize;
    while let Some(entry) = results.next().await {
        let entry = entry?;
        count += 1;
        let listed = ListedEntry {
            key: entry.key.to_string(),
            size: entry.size,
            value: entry
                .value
                .as_deref()
                .map(|v| String::from_utf8_lossy(v).into_owned()),
        };

        if args.json {
            println!("{}", serde_json::to_string(&listed)?);
        } else {
            match &listed.value {
                Some(value) => println!("{:>10}  {}  {}", listed.size, listed.key, value),
                None => println!("{:>10}  {}", listed.size, listed.key),
            }
        }
    }

    if !args.json {
        eprintln!("{} entries", count);
    }
    Ok(())
}

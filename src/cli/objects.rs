//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了单键命令的实现。

use super::{GetArgs, PutArgs, RmArgs, StatArgs};
use crate::client::BlobStore;
use crate::error::StoreError;
use crate::key::Key;
use anyhow::{bail, Context, Result};
use std::io::{Read, Write};

pub async fn execute_get(store: &BlobStore, args: &GetArgs) -> Result<()> {
    let key = Key::new(&args.key);
    let value = store
        .get(&key)
        .await
        .with_context(|| format!("Failed to read {}", key))?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &value)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {} bytes to {}", value.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&value)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

pub async fn execute_put(store: &BlobStore, args: &PutArgs) -> Result<()> {
    let value = match (&args.value, &args.file) {
        (Some(_), Some(_)) => bail!("Pass either a value or --file, not both"),
        (Some(value), None) => value.clone().into_bytes(),
        (None, Some(path)) => {
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?
        }
        (None, None) => {
            let mut buffer = Vec::new();
            std::io::stdin().read_to_end(&mut buffer)?;
            buffer
        }
    };

    let key = Key::new(&args.key);
    let len = value.len();
    store
        .put(&key, value)
        .await
        .with_context(|| format!("Failed to write {}", key))?;
    println!("Stored {} ({} bytes)", key, len);
    Ok(())
}

pub async fn execute_rm(store: &BlobStore, args: &RmArgs) -> Result<()> {
    if let [single] = args.keys.as_slice() {
        let key = Key::new(single);
        store
            .delete(&key)
            .await
            .with_context(|| format!("Failed to delete {}", key))?;
        println!("Deleted {}", key);
        return Ok(());
    }

    let mut batch = store.batch()?;
    for key in &args.keys {
        batch.delete(Key::new(key));
    }
    let total = batch.len();

    match batch.commit().await {
        Ok(()) => {
            println!("Deleted {} keys", total);
            Ok(())
        }
        Err(StoreError::PartialBatchFailure(failure)) => {
            println!("Deleted {} keys", total - failure.len());
            for f in failure.failures() {
                eprintln!("  ❌ {}: {}", f.key, f.error);
            }
            bail!("{} of {} deletes failed", failure.len(), total)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn execute_stat(store: &BlobStore, args: &StatArgs) -> Result<()> {
    let key = Key::new(&args.key);
    match store.get_size(&key).await {
        Ok(size) => {
            println!("Key:    {}", key);
            println!("Exists: yes");
            println!("Size:   {} bytes", size);
        }
        Err(e) if e.is_not_found() => {
            println!("Key:    {}", key);
            println!("Exists: no");
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to stat {}", key)),
    }
    Ok(())
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了本地键缓存：键到大小/存在性的映射。
//!
//! 缓存由存储实例持有，通过 [`crate::sync::sweep::KeySweeper`] 定期与后端全量对账。
//! 每个操作单独加锁：读取持共享锁，修改持独占锁，任何锁都不会跨越一次完整的列表过程。

use crate::key::Key;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// 缓存条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEntry {
    /// 已知大小
    Sized(u64),
    /// 已知存在，大小未知
    Exists,
}

impl CacheEntry {
    /// "存在但大小未知"的整数哨兵值
    pub const UNKNOWN_SIZE: i64 = -1;

    /// 整数形式，`Exists` 为 -1
    pub fn raw(&self) -> i64 {
        match self {
            CacheEntry::Sized(size) => i64::try_from(*size).unwrap_or(i64::MAX),
            CacheEntry::Exists => Self::UNKNOWN_SIZE,
        }
    }

    /// 从整数形式还原，负数视为哨兵
    pub fn from_raw(raw: i64) -> Self {
        u64::try_from(raw)
            .map(CacheEntry::Sized)
            .unwrap_or(CacheEntry::Exists)
    }

    pub fn size(&self) -> Option<u64> {
        match self {
            CacheEntry::Sized(size) => Some(*size),
            CacheEntry::Exists => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    entry: CacheEntry,
    /// 每次写入都分配新的戳，对账时据此判断条目在快照之后是否被改写
    stamp: u64,
}

/// 缓存键集合快照：键 -> 写入戳
pub type CacheSnapshot = HashMap<Key, u64>;

/// 本地键缓存
#[derive(Debug, Default)]
pub struct KeyCache {
    entries: RwLock<HashMap<Key, Slot>>,
    next_stamp: AtomicU64,
}

impl KeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Key, Slot>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Key, Slot>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn stamp(&self) -> u64 {
        self.next_stamp.fetch_add(1, Ordering::Relaxed)
    }

    /// 查询条目
    pub fn get(&self, key: &Key) -> Option<CacheEntry> {
        self.read().get(key).map(|slot| slot.entry)
    }

    /// 键是否存在于缓存
    pub fn has(&self, key: &Key) -> bool {
        self.read().contains_key(key)
    }

    /// 写入（覆盖）条目
    pub fn put(&self, key: Key, entry: CacheEntry) {
        let stamp = self.stamp();
        debug!("KeyCache put: key={}, entry={:?}", key, entry);
        self.write().insert(key, Slot { entry, stamp });
    }

    /// 删除条目，返回是否存在过
    pub fn del(&self, key: &Key) -> bool {
        debug!("KeyCache del: key={}", key);
        self.write().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// 在共享锁下获取当前键集合及其写入戳
    pub fn snapshot(&self) -> CacheSnapshot {
        self.read()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.stamp))
            .collect()
    }

    /// 清空缓存
    pub fn clear(&self) {
        self.write().clear();
    }

    /// 仅当条目自快照以来未被改写时删除
    pub(crate) fn remove_if_unchanged(&self, key: &Key, stamp: u64) -> bool {
        let mut entries = self.write();
        match entries.get(key) {
            Some(slot) if slot.stamp == stamp => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// 仅当键不存在时插入
    pub(crate) fn insert_if_absent(&self, key: Key, entry: CacheEntry) -> bool {
        let stamp = self.stamp();
        let mut entries = self.write();
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, Slot { entry, stamp });
        true
    }
}

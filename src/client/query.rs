//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了前缀查询及其分页结果。

use crate::backend::ListedObject;
use crate::client::store::StoreCore;
use crate::error::{Result, StoreError};
use crate::key::Key;
use futures::stream::{self, Stream};
use std::sync::Arc;
use tracing::debug;

/// 查询过滤器，当前存储不支持任何过滤器
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// 键等于
    KeyEquals(String),
    /// 键大于（字典序）
    KeyGreaterThan(String),
    /// 值等于
    ValueEquals(Vec<u8>),
}

/// 查询排序，当前存储不支持任何排序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    KeyAscending,
    KeyDescending,
    ValueAscending,
}

/// 前缀查询
///
/// `limit` 为 0 表示不限制。结果顺序为后端列表顺序。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub prefix: String,
    pub keys_only: bool,
    pub limit: usize,
    pub offset: usize,
    pub filters: Vec<Filter>,
    pub orders: Vec<Order>,
}

impl Query {
    /// 以 `prefix` 为前缀的查询
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn keys_only(mut self, keys_only: bool) -> Self {
        self.keys_only = keys_only;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    /// 拒绝过滤器和排序
    pub fn validate(&self) -> Result<()> {
        if !self.filters.is_empty() {
            return Err(StoreError::Validation(
                "query filters are not supported".to_string(),
            ));
        }
        if !self.orders.is_empty() {
            return Err(StoreError::Validation(
                "query orders are not supported".to_string(),
            ));
        }
        Ok(())
    }
}

/// 查询结果条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Key,
    /// 列表给出的对象大小
    pub size: u64,
    /// 对象内容，`keys_only` 时为 None
    pub value: Option<Vec<u8>>,
}

/// 查询游标
///
/// 记录产生当前页的续页令牌、当前页内的位置，以及已跳过和已产出的条目数，
/// 可用于从中断处继续同一查询。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCursor {
    /// 产生当前页的续页令牌，None 表示第一页
    pub token: Option<String>,
    /// 当前页内下一个待处理的位置
    pub index: usize,
    /// 已按 offset 跳过的条目数
    pub skipped: usize,
    /// 已产出的条目数
    pub yielded: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PagerState {
    /// 当前页尚未取回
    Pending,
    Active,
    Done,
}

/// 查询结果
///
/// 惰性分页：只在当前页耗尽时才请求下一页。任何错误都会结束序列。
pub struct QueryResults {
    core: Arc<StoreCore>,
    query: Query,
    list_prefix: String,
    page: Vec<ListedObject>,
    cursor: PageCursor,
    next_token: Option<String>,
    state: PagerState,
}

impl QueryResults {
    pub(crate) fn new(core: Arc<StoreCore>, query: Query) -> Result<Self> {
        Self::resume(core, query, PageCursor::default())
    }

    pub(crate) fn resume(core: Arc<StoreCore>, query: Query, cursor: PageCursor) -> Result<Self> {
        query.validate()?;
        let list_prefix = core.list_prefix_for(&query.prefix);
        debug!(
            "QueryResults: prefix={:?}, list_prefix={:?}, limit={}, offset={}, keys_only={}",
            query.prefix, list_prefix, query.limit, query.offset, query.keys_only
        );
        Ok(Self {
            core,
            query,
            list_prefix,
            page: Vec::new(),
            cursor,
            next_token: None,
            state: PagerState::Pending,
        })
    }

    /// 当前游标
    pub fn cursor(&self) -> PageCursor {
        self.cursor.clone()
    }

    fn limit_reached(&self) -> bool {
        self.query.limit > 0 && self.cursor.yielded >= self.query.limit
    }

    /// 下一页请求的条目数
    ///
    /// 从游标恢复时当前页以同一令牌重新取回，请求数需覆盖 `cursor.index` 之前已处理的条目
    fn page_size(&self) -> usize {
        let cap = self.core.backend.capabilities().max_list_page.max(1);
        if self.query.limit == 0 {
            return cap;
        }
        let wanted = (self.query.limit + self.query.offset)
            .saturating_sub(self.cursor.skipped + self.cursor.yielded);
        (self.cursor.index + wanted).clamp(1, cap)
    }

    async fn fetch(&mut self) -> Result<()> {
        let size = self.page_size();
        let page = self
            .core
            .list_page(&self.list_prefix, self.cursor.token.clone(), size)
            .await?;
        debug!(
            "QueryResults: 取回一页 {} 个对象, has_more={}",
            page.objects.len(),
            page.next_token.is_some()
        );
        self.page = page.objects;
        self.next_token = page.next_token;
        self.state = PagerState::Active;
        Ok(())
    }

    fn finish(&mut self) {
        self.state = PagerState::Done;
        self.page.clear();
        self.next_token = None;
    }

    /// 取出下一个条目
    ///
    /// # 返回值
    ///
    /// 序列结束时返回 None；出错时返回该错误，之后序列结束
    pub async fn next(&mut self) -> Option<Result<Entry>> {
        loop {
            if self.state == PagerState::Done {
                return None;
            }
            if self.limit_reached() {
                self.finish();
                return None;
            }

            if self.state == PagerState::Pending {
                if let Err(e) = self.fetch().await {
                    self.finish();
                    return Some(Err(e));
                }
            }

            if self.cursor.index >= self.page.len() {
                match self.next_token.take() {
                    Some(token) => {
                        self.cursor.token = Some(token);
                        self.cursor.index = 0;
                        self.state = PagerState::Pending;
                        continue;
                    }
                    None => {
                        self.finish();
                        return None;
                    }
                }
            }

            let object = self.page[self.cursor.index].clone();
            self.cursor.index += 1;

            if self.cursor.skipped < self.query.offset {
                self.cursor.skipped += 1;
                continue;
            }

            let key = self.core.key_for(&object.path);
            let value = if self.query.keys_only {
                None
            } else {
                match self.core.get(&key).await {
                    Ok(value) => Some(value),
                    Err(e) if e.is_not_found() => {
                        debug!("QueryResults: 列出后被删除的键 {}，跳过", key);
                        continue;
                    }
                    Err(e) => {
                        self.finish();
                        return Some(Err(e));
                    }
                }
            };

            self.cursor.yielded += 1;
            return Some(Ok(Entry {
                key,
                size: object.size,
                value,
            }));
        }
    }

    /// 读取全部剩余条目，遇到第一个错误即返回
    pub async fn collect_all(mut self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next().await {
            entries.push(entry?);
        }
        Ok(entries)
    }

    /// 转换为异步流
    pub fn into_stream(self) -> impl Stream<Item = Result<Entry>> + Send {
        stream::unfold(self, |mut results| async move {
            results.next().await.map(|entry| (entry, results))
        })
    }
}

impl std::fmt::Debug for QueryResults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResults")
            .field("query", &self.query)
            .field("list_prefix", &self.list_prefix)
            .field("cursor", &self.cursor)
            .field("state", &self.state)
            .finish()
    }
}

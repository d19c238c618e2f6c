//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了批量提交的公共类型

use crate::error::{KeyFailure, StoreError};
use crate::key::Key;

/// 批量操作类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// 写入
    Put(Vec<u8>),
    /// 删除
    Delete,
}

impl BatchOp {
    pub fn is_put(&self) -> bool {
        matches!(self, BatchOp::Put(_))
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, BatchOp::Delete)
    }
}

/// 将同一错误展开为一组键的失败
pub(crate) fn fail_all<F>(keys: &[Key], make_error: F) -> Vec<KeyFailure>
where
    F: Fn() -> StoreError,
{
    keys.iter()
        .map(|key| KeyFailure {
            key: key.to_string(),
            error: make_error(),
        })
        .collect()
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了层级式的存储键。

use std::fmt;

/// 层级路径式的存储键
///
/// 构造时规范化：总是以 `/` 开头、不以 `/` 结尾，空段和 `.` 段被丢弃，
/// `..` 段回退一级。规范化之后按字符串精确比较。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    /// 创建并规范化一个键
    pub fn new(raw: impl AsRef<str>) -> Self {
        let mut segments: Vec<&str> = Vec::new();
        for segment in raw.as_ref().split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s),
            }
        }
        Key(format!("/{}", segments.join("/")))
    }

    /// 根键 `/`
    pub fn root() -> Self {
        Key("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 去掉开头 `/` 之后的相对路径
    pub fn relative(&self) -> &str {
        self.0.trim_start_matches('/')
    }

    /// 最后一段名称
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// 父键，根键的父键仍是根键
    pub fn parent(&self) -> Key {
        match self.0.rfind('/') {
            Some(0) | None => Key::root(),
            Some(idx) => Key(self.0[..idx].to_string()),
        }
    }

    /// 拼接子路径
    pub fn child(&self, name: impl AsRef<str>) -> Key {
        Key::new(format!("{}/{}", self.0, name.as_ref()))
    }

    /// 判断 `self` 是否是 `other` 的祖先
    pub fn is_ancestor_of(&self, other: &Key) -> bool {
        if self.0 == "/" {
            return other.0 != "/";
        }
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(raw: &str) -> Self {
        Key::new(raw)
    }
}

impl From<String> for Key {
    fn from(raw: String) -> Self {
        Key::new(raw)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了存储的并发机制，包括有界工作池、批量提交和键缓存对账。

pub mod batch;
pub mod common;
pub mod pool;
pub mod sweep;

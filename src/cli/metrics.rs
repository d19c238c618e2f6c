//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了指标输出。

use crate::metrics::get_metrics_string;

pub fn print_metrics() {
    let metrics = get_metrics_string();
    if metrics.is_empty() {
        eprintln!("No metrics collected");
    } else {
        eprint!("{}", metrics);
    }
}

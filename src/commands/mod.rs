// 命令模块

pub mod scan;

pub use scan::{run_scan, scan_with};

// 检测模块
//
// 检测算法本身由外部程序提供，这里只负责把它适配为流水线的 Detector。
//
// 子模块：
// - detector: 启动外部检测子进程、解析 JSON 检测记录

pub mod detector;

pub use detector::ExternalDetector;

// FaceScan - 人脸特征批量检测
//
// 核心是 pipeline：检测线程组 + 导出线程组，输入队列带背压。
// 检测算法与结果持久化以 Detector / Finisher 注入。

pub mod commands;
pub mod config;
pub mod detection;
pub mod error;
pub mod export;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod utils;

pub use error::{AppError, AppResult};
pub use models::{DetectionKind, DetectionRecord, ResultPackage};
pub use pipeline::{Detector, Finisher, Pipeline};

// 目录扫描命令
//
// 递归遍历目录，把图片逐个提交给流水线。遍历是唯一的提交方，
// 输入队列到达高水位时遍历本身会被阻塞，不会一次性把整个目录读进内存。

use crate::config::AppConfig;
use crate::detection::ExternalDetector;
use crate::error::{AppError, AppResult};
use crate::export::FaceExporter;
use crate::pipeline::stats::StatsSnapshot;
use crate::pipeline::{Detector, Finisher, Pipeline};
use crate::utils::{is_face_crop, is_image_file};
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

/// 使用配置中的外部检测程序和人脸导出器扫描目录
pub fn run_scan(root: &Path, config: &AppConfig) -> AppResult<StatsSnapshot> {
    config.validate()?;
    let detector = ExternalDetector::from_config(&config.detector)?;
    let exporter = FaceExporter::new(config.export.clone());
    scan_with(root, config, detector, exporter)
}

/// 扫描目录，检测器和导出器由调用方注入
pub fn scan_with<D, F>(root: &Path, config: &AppConfig, detector: D, finisher: F) -> AppResult<StatsSnapshot>
where
    D: Detector + 'static,
    F: Finisher + 'static,
{
    if !root.exists() {
        return Err(AppError::NotFound(format!("目录不存在: {}", root.display())));
    }

    info!("[SCAN] === 开始扫描 === {}", root.display());
    let pipeline = Pipeline::new(&config.pipeline, detector, finisher)?;

    let mut skipped = 0usize;
    let walk_result = (|| -> AppResult<()> {
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("[SCAN] 遍历失败: {}", e);
                    skipped += 1;
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().is_file() || !is_image_file(path) || is_face_crop(path) {
                continue;
            }
            pipeline.submit(path)?;
        }
        Ok(())
    })();

    // 遍历出错也要先关闭流水线，保证已提交的图片处理完
    pipeline.shutdown()?;
    walk_result?;

    let stats = pipeline.stats();
    info!(
        "[SCAN] === 扫描完成 === 图片={}, 有人脸={}, 已导出={}, 遍历失败={}",
        stats.submitted, stats.detected, stats.completed, skipped
    );
    Ok(stats)
}

// 两组工作线程的主循环
//
// 检测线程：输入队列 → Detector → (非空结果) → 结果通道
// 导出线程：结果通道 → Finisher
//
// 停止标志只在两次任务之间检查，正在执行的 Detector/Finisher 调用不会被打断。
// 单个元素的失败在这里被吸收：计数、记日志、丢弃，不重试也不回队。

use super::queue::WorkQueue;
use super::stats::PipelineStats;
use super::{Detector, Finisher};
use crate::error::{AppError, AppResult};
use crate::models::ResultPackage;
use crossbeam_channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub(super) struct DetectionWorker {
    pub id: usize,
    pub input: Arc<WorkQueue<PathBuf>>,
    pub results: Sender<ResultPackage>,
    pub detector: Arc<dyn Detector>,
    pub stats: Arc<PipelineStats>,
}

impl DetectionWorker {
    pub fn run(self) {
        debug!("[DETECT] 检测线程 {} 启动", self.id);

        // pop 返回 None 说明已停止且输入队列已清空
        while let Some(item) = self.input.pop() {
            let outcome = guarded(|| self.detector.detect(&item), AppError::Detection);

            match outcome {
                Ok(records) if records.is_empty() => {
                    self.stats.record_empty_detection();
                    debug!("[DETECT] {} 未检测到任何区域", item.display());
                }
                Ok(records) => {
                    debug!("[DETECT] {} -> {} 条检测记录", item.display(), records.len());
                    let package = ResultPackage { source: item, records };
                    match self.results.send(package) {
                        Ok(()) => self.stats.record_detected(),
                        Err(e) => {
                            // 导出线程全部退出后才会发生
                            self.stats.record_detection_failure();
                            error!("[DETECT] 结果通道已断开，丢弃 {}", e.0.source.display());
                        }
                    }
                }
                Err(e) => {
                    self.stats.record_detection_failure();
                    warn!("[DETECT] {} 检测失败: {}", item.display(), e);
                }
            }
        }

        debug!("[DETECT] 检测线程 {} 退出", self.id);
    }
}

pub(super) struct CompletionWorker {
    pub id: usize,
    pub results: Receiver<ResultPackage>,
    pub finisher: Arc<dyn Finisher>,
    pub stats: Arc<PipelineStats>,
}

impl CompletionWorker {
    pub fn run(self) {
        debug!("[COMPLETE] 导出线程 {} 启动", self.id);

        // 所有发送端释放且通道清空后 recv 返回 Err
        while let Ok(package) = self.results.recv() {
            match guarded(|| self.finisher.finish(&package), AppError::Completion) {
                Ok(()) => self.stats.record_completed(),
                Err(e) => {
                    self.stats.record_completion_failure();
                    warn!("[COMPLETE] {} 导出失败: {}", package.source.display(), e);
                }
            }
        }

        debug!("[COMPLETE] 导出线程 {} 退出", self.id);
    }
}

/// 执行一次注入的回调，把 panic 转为普通错误
///
/// 线程若因 panic 退出，输入队列将少一个消费者，极端情况下提交方会在背压处永久等待。
fn guarded<T>(
    call: impl FnOnce() -> AppResult<T>,
    wrap: fn(String) -> AppError,
) -> AppResult<T> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(wrap(format!("回调 panic: {}", panic_message(payload.as_ref())))))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知 panic".to_string()
    }
}

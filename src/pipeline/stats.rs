// 流水线计数器
//
// 单个元素的检测/导出失败不会反馈给提交方，只体现在这里的计数和日志中。

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineStats {
    submitted: AtomicU64,
    throttled: AtomicU64,
    detected: AtomicU64,
    empty_detections: AtomicU64,
    detection_failures: AtomicU64,
    completed: AtomicU64,
    completion_failures: AtomicU64,
}

/// 某一时刻的计数快照
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// 被接受的提交数
    pub submitted: u64,
    /// 提交方因背压等待的次数
    pub throttled: u64,
    /// 生成结果包的检测数
    pub detected: u64,
    /// 检测成功但没有任何记录
    pub empty_detections: u64,
    pub detection_failures: u64,
    pub completed: u64,
    pub completion_failures: u64,
}

impl StatsSnapshot {
    /// 已经走完检测阶段的元素数（无论结果如何）
    pub fn detection_settled(&self) -> u64 {
        self.detected + self.empty_detections + self.detection_failures
    }

    /// 已经走完导出阶段的结果包数
    pub fn completion_settled(&self) -> u64 {
        self.completed + self.completion_failures
    }

    /// 所有被接受的元素都已有最终去向
    pub fn is_fully_drained(&self) -> bool {
        self.detection_settled() == self.submitted && self.completion_settled() == self.detected
    }
}

impl PipelineStats {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// 提交被拒绝时撤销预先记入的计数
    pub(crate) fn revert_submitted(&self) {
        self.submitted.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn record_throttle(&self) {
        self.throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_detected(&self) {
        self.detected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_empty_detection(&self) {
        self.empty_detections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_detection_failure(&self) {
        self.detection_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completion_failure(&self) {
        self.completion_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            detected: self.detected.load(Ordering::Relaxed),
            empty_detections: self.empty_detections.load(Ordering::Relaxed),
            detection_failures: self.detection_failures.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            completion_failures: self.completion_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drained_accounting() {
        let stats = PipelineStats::default();
        for _ in 0..4 {
            stats.record_submitted();
        }
        stats.record_detected();
        stats.record_detected();
        stats.record_empty_detection();
        assert!(!stats.snapshot().is_fully_drained());

        stats.record_detection_failure();
        stats.record_completed();
        stats.record_completion_failure();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.detection_settled(), 4);
        assert_eq!(snapshot.completion_settled(), 2);
        assert!(snapshot.is_fully_drained());
    }
}

// 输入队列背压控制
//
// 提交方枚举文件的速度远快于检测速度，不加限制时输入队列会无限增长。
// 采用高/低双水位线：
// 1. 入队后深度 >= 高水位 (4N) 时提交方进入等待
// 2. 检测线程每取走一个元素都会唤醒等待者
// 3. 深度降到 <= 低水位 (2N) 时提交方恢复
// 高水位为 4N 保证检测线程在提交方恢复之前始终有活可干；
// 两个阈值分开避免提交方在单一阈值附近反复阻塞/唤醒。

use super::queue::WorkQueue;
use super::stats::PipelineStats;
use tracing::debug;

/// 每个检测线程对应的高水位深度
const HIGH_WATERMARK_PER_WORKER: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermarks {
    pub high: usize,
    pub low: usize,
}

impl Watermarks {
    /// 由检测线程数 N 推导：high = 4N，low = high / 2
    pub fn for_workers(detection_workers: usize) -> Self {
        let high = HIGH_WATERMARK_PER_WORKER * detection_workers;
        Self { high, low: high / 2 }
    }
}

pub struct Governor {
    marks: Watermarks,
}

impl Governor {
    pub fn new(detection_workers: usize) -> Self {
        Self {
            marks: Watermarks::for_workers(detection_workers),
        }
    }

    pub fn watermarks(&self) -> Watermarks {
        self.marks
    }

    /// 根据入队后的深度决定是否让提交方等待
    ///
    /// 返回 true 表示本次提交被限流过。等待无超时，只依赖检测线程的出队通知。
    pub fn admit<T>(&self, queue: &WorkQueue<T>, depth: usize, stats: &PipelineStats) -> bool {
        if depth < self.marks.high {
            return false;
        }

        stats.record_throttle();
        debug!(
            "[PIPELINE] 输入队列深度 {} 达到高水位 {}，提交方等待降到 {}",
            depth, self.marks.high, self.marks.low
        );
        let resumed_at = queue.wait_until_len_at_most(self.marks.low);
        debug!("[PIPELINE] 输入队列深度降至 {}，提交方恢复", resumed_at);
        true
    }
}

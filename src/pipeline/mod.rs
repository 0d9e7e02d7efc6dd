// 双阶段线程池流水线
//
// 提交方 → 输入队列（有界，背压） → 检测线程组 → 结果通道（无界） → 导出线程组
//
// 关闭顺序：先停检测组（清空输入队列后退出），再停导出组（清空结果通道后退出）。
// 检测组全部退出后不会再产生新的结果包，所以此时关闭结果通道是安全的。
//
// 子模块：
// - queue: 带停止标志的阻塞 FIFO
// - backpressure: 高/低水位线限流
// - workers: 两组线程的主循环
// - stats: 观测计数

pub mod backpressure;
mod queue;
pub mod stats;
mod workers;

use crate::config::PipelineConfig;
use crate::error::{AppError, AppResult};
use crate::models::{DetectionRecord, ResultPackage};
use backpressure::{Governor, Watermarks};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use queue::WorkQueue;
use stats::{PipelineStats, StatsSnapshot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info};
use workers::{CompletionWorker, DetectionWorker};

/// 检测器：由多个检测线程并发调用，实现方不能依赖未加锁的共享可变状态
pub trait Detector: Send + Sync {
    fn detect(&self, item: &Path) -> AppResult<Vec<DetectionRecord>>;
}

impl<F> Detector for F
where
    F: Fn(&Path) -> AppResult<Vec<DetectionRecord>> + Send + Sync,
{
    fn detect(&self, item: &Path) -> AppResult<Vec<DetectionRecord>> {
        self(item)
    }
}

/// 结果处理器：由多个导出线程并发调用
///
/// 多个结果包可能写入同一个外部汇总（例如同一目录的 result.json），
/// 对同一汇总的并发写入由实现方自行同步。
pub trait Finisher: Send + Sync {
    fn finish(&self, package: &ResultPackage) -> AppResult<()>;
}

impl<F> Finisher for F
where
    F: Fn(&ResultPackage) -> AppResult<()> + Send + Sync,
{
    fn finish(&self, package: &ResultPackage) -> AppResult<()> {
        self(package)
    }
}

/// 生命周期状态，shutdown 时一次性取出
struct Lifecycle {
    closed: bool,
    detection_workers: Vec<JoinHandle<()>>,
    completion_workers: Vec<JoinHandle<()>>,
    /// 流水线自身持有的结果通道发送端，释放它即通知导出组停止
    results: Option<Sender<ResultPackage>>,
}

pub struct Pipeline {
    input: Arc<WorkQueue<PathBuf>>,
    governor: Governor,
    stats: Arc<PipelineStats>,
    lifecycle: Mutex<Lifecycle>,
}

impl Pipeline {
    /// 创建流水线并立即启动两组工作线程
    ///
    /// 任一组线程数为 0 时返回 `InvalidConfiguration`：没有消费者的队列一旦到达高水位，
    /// submit 会永久阻塞。
    pub fn new<D, F>(config: &PipelineConfig, detector: D, finisher: F) -> AppResult<Self>
    where
        D: Detector + 'static,
        F: Finisher + 'static,
    {
        config.validate()?;

        let input = Arc::new(WorkQueue::new());
        let stats = Arc::new(PipelineStats::default());
        let detector: Arc<dyn Detector> = Arc::new(detector);
        let finisher: Arc<dyn Finisher> = Arc::new(finisher);
        let (results_tx, results_rx) = crossbeam_channel::unbounded::<ResultPackage>();

        let mut lifecycle = Lifecycle {
            closed: false,
            detection_workers: Vec::with_capacity(config.detection_workers),
            completion_workers: Vec::with_capacity(config.completion_workers),
            results: Some(results_tx.clone()),
        };

        let spawned = (|| -> std::io::Result<()> {
            for id in 0..config.completion_workers {
                let worker = CompletionWorker {
                    id,
                    results: results_rx.clone(),
                    finisher: Arc::clone(&finisher),
                    stats: Arc::clone(&stats),
                };
                let handle = thread::Builder::new()
                    .name(format!("complete-{}", id))
                    .spawn(move || worker.run())?;
                lifecycle.completion_workers.push(handle);
            }

            for id in 0..config.detection_workers {
                let worker = DetectionWorker {
                    id,
                    input: Arc::clone(&input),
                    results: results_tx.clone(),
                    detector: Arc::clone(&detector),
                    stats: Arc::clone(&stats),
                };
                let handle = thread::Builder::new()
                    .name(format!("detect-{}", id))
                    .spawn(move || worker.run())?;
                lifecycle.detection_workers.push(handle);
            }
            Ok(())
        })();

        // 线程句柄之外不再保留通道端，否则导出组无法感知关闭
        drop(results_tx);
        drop(results_rx);

        let pipeline = Self {
            input,
            governor: Governor::new(config.detection_workers),
            stats,
            lifecycle: Mutex::new(lifecycle),
        };

        if let Err(e) = spawned {
            error!("[PIPELINE] 创建工作线程失败: {}", e);
            // 回收已经启动的线程
            let _ = pipeline.shutdown();
            return Err(AppError::Io(e));
        }

        let marks = pipeline.governor.watermarks();
        info!(
            "[PIPELINE] 流水线已启动: 检测线程={}, 导出线程={}, 高水位={}, 低水位={}",
            config.detection_workers, config.completion_workers, marks.high, marks.low
        );
        Ok(pipeline)
    }

    /// 提交一个工作项
    ///
    /// 输入队列到达高水位时阻塞调用方，直到深度降到低水位。
    /// 关闭开始后返回 `PoolClosed`。处理结果不会反馈给调用方。
    pub fn submit(&self, item: impl Into<PathBuf>) -> AppResult<()> {
        // 先计数再入队，工作线程看到的提交数不会少于它已处理的数量
        self.stats.record_submitted();
        let depth = match self.input.push(item.into()) {
            Ok(depth) => depth,
            Err(_) => {
                self.stats.revert_submitted();
                return Err(AppError::PoolClosed);
            }
        };
        self.governor.admit(&self.input, depth, &self.stats);
        Ok(())
    }

    /// 按顺序关闭两组线程，返回前保证所有已接受的元素都已处理或被记为失败
    ///
    /// 第二次调用返回 `AlreadyClosed`。
    pub fn shutdown(&self) -> AppResult<()> {
        // 只在锁内取出状态，join 期间不持锁，重复调用可立即得到 AlreadyClosed
        let (detection_workers, completion_workers, results) = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.closed {
                return Err(AppError::AlreadyClosed);
            }
            lifecycle.closed = true;
            // 阶段一：停止检测组。在 closed 可见之前完成，之后的 submit 一定返回 PoolClosed
            self.input.stop();
            (
                std::mem::take(&mut lifecycle.detection_workers),
                std::mem::take(&mut lifecycle.completion_workers),
                lifecycle.results.take(),
            )
        };

        info!("[PIPELINE] 开始关闭，输入队列剩余 {} 项", self.input.len());

        // 各检测线程取完输入队列后退出
        join_all("检测", detection_workers);

        // 阶段二：检测组已全部退出，释放最后一个发送端，导出组清空通道后退出
        drop(results);
        join_all("导出", completion_workers);

        let snapshot = self.stats.snapshot();
        info!(
            "[PIPELINE] 关闭完成: 提交={}, 限流={}, 有结果={}, 无结果={}, 检测失败={}, 导出成功={}, 导出失败={}",
            snapshot.submitted,
            snapshot.throttled,
            snapshot.detected,
            snapshot.empty_detections,
            snapshot.detection_failures,
            snapshot.completed,
            snapshot.completion_failures
        );
        Ok(())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// 输入队列当前深度
    pub fn queue_depth(&self) -> usize {
        self.input.len()
    }

    pub fn watermarks(&self) -> Watermarks {
        self.governor.watermarks()
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle.lock().closed
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if !self.is_closed() {
            let _ = self.shutdown();
        }
    }
}

fn join_all(group: &str, handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        let name = handle.thread().name().unwrap_or("?").to_string();
        if handle.join().is_err() {
            error!("[PIPELINE] {}线程 {} 异常退出", group, name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DetectionKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn face() -> DetectionRecord {
        DetectionRecord::new(DetectionKind::Face, 0, 0, 8, 8)
    }

    fn no_records(_: &Path) -> AppResult<Vec<DetectionRecord>> {
        Ok(vec![])
    }

    fn discard(_: &ResultPackage) -> AppResult<()> {
        Ok(())
    }

    #[test]
    fn test_zero_detection_workers_rejected() {
        let result = Pipeline::new(
            &PipelineConfig::new(0, 2),
            no_records,
            discard,
        );
        assert!(matches!(result, Err(AppError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_zero_completion_workers_rejected() {
        let result = Pipeline::new(
            &PipelineConfig::new(2, 0),
            no_records,
            discard,
        );
        assert!(matches!(result, Err(AppError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_failures_are_absorbed_and_counted() {
        let finished = Arc::new(AtomicUsize::new(0));
        let finished_in = Arc::clone(&finished);

        let pipeline = Pipeline::new(
            &PipelineConfig::new(3, 2),
            |item: &Path| -> AppResult<Vec<DetectionRecord>> {
                match item.to_str() {
                    Some("bad") => Err(AppError::Detection("unreadable".into())),
                    Some("panic") => panic!("detector crashed"),
                    Some("none") => Ok(vec![]),
                    _ => Ok(vec![face()]),
                }
            },
            move |package: &ResultPackage| -> AppResult<()> {
                if package.source == Path::new("fail-export") {
                    return Err(AppError::Completion("disk full".into()));
                }
                finished_in.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .unwrap();

        for item in ["ok-1", "bad", "panic", "none", "fail-export", "ok-2"] {
            pipeline.submit(item).unwrap();
        }
        pipeline.shutdown().unwrap();

        let stats = pipeline.stats();
        assert_eq!(stats.submitted, 6);
        assert_eq!(stats.detection_failures, 2);
        assert_eq!(stats.empty_detections, 1);
        assert_eq!(stats.detected, 3);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.completion_failures, 1);
        assert!(stats.is_fully_drained());
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_lifecycle_errors() {
        let pipeline = Pipeline::new(
            &PipelineConfig::new(1, 1),
            no_records,
            discard,
        )
        .unwrap();

        assert!(!pipeline.is_closed());
        pipeline.shutdown().unwrap();
        assert!(pipeline.is_closed());
        assert!(matches!(pipeline.submit("late.jpg"), Err(AppError::PoolClosed)));
        assert!(matches!(pipeline.shutdown(), Err(AppError::AlreadyClosed)));
        assert_eq!(pipeline.stats().submitted, 0);
    }

    #[test]
    fn test_submission_counted_before_detection() {
        let shared: Arc<Mutex<Option<Arc<PipelineStats>>>> = Arc::new(Mutex::new(None));
        let undercounted = Arc::new(AtomicUsize::new(0));
        let (shared_in, undercounted_in) = (Arc::clone(&shared), Arc::clone(&undercounted));

        let pipeline = Pipeline::new(
            &PipelineConfig::new(4, 1),
            move |_: &Path| -> AppResult<Vec<DetectionRecord>> {
                if let Some(stats) = shared_in.lock().as_ref() {
                    let snapshot = stats.snapshot();
                    // 当前元素尚未计入任何检测结果
                    if snapshot.submitted < snapshot.detection_settled() + 1 {
                        undercounted_in.fetch_add(1, Ordering::SeqCst);
                    }
                }
                Ok(vec![])
            },
            discard,
        )
        .unwrap();
        *shared.lock() = Some(Arc::clone(&pipeline.stats));

        for i in 0..200 {
            pipeline.submit(format!("img-{}.jpg", i)).unwrap();
        }
        pipeline.shutdown().unwrap();
        *shared.lock() = None;

        assert_eq!(undercounted.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.stats().submitted, 200);
        assert_eq!(pipeline.stats().empty_detections, 200);
    }

    #[test]
    fn test_rejected_submit_not_counted() {
        let pipeline = Pipeline::new(
            &PipelineConfig::new(1, 1),
            no_records,
            discard,
        )
        .unwrap();
        pipeline.submit("early.jpg").unwrap();
        pipeline.shutdown().unwrap();
        for _ in 0..3 {
            assert!(matches!(pipeline.submit("late.jpg"), Err(AppError::PoolClosed)));
        }
        assert_eq!(pipeline.stats().submitted, 1);
        assert!(pipeline.stats().is_fully_drained());
    }

    #[test]
    fn test_drop_drains_pending_work() {
        let finished = Arc::new(AtomicUsize::new(0));
        {
            let finished_in = Arc::clone(&finished);
            let pipeline = Pipeline::new(
                &PipelineConfig::new(2, 2),
                |_: &Path| -> AppResult<Vec<DetectionRecord>> { Ok(vec![face()]) },
                move |_: &ResultPackage| -> AppResult<()> {
                    finished_in.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            )
            .unwrap();
            for i in 0..20 {
                pipeline.submit(format!("img-{}.jpg", i)).unwrap();
            }
        }
        assert_eq!(finished.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_watermarks_follow_detection_workers() {
        let pipeline = Pipeline::new(
            &PipelineConfig::new(3, 1),
            no_records,
            discard,
        )
        .unwrap();
        assert_eq!(pipeline.watermarks(), Watermarks { high: 12, low: 6 });
        pipeline.shutdown().unwrap();
        assert_eq!(pipeline.queue_depth(), 0);
    }
}

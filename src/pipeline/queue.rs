// 线程安全的 FIFO 工作队列
//
// 一把互斥锁 + 两个条件变量：
// - `available`：队列非空或已停止时唤醒消费者
// - `drained`：每次出队后唤醒等待队列深度下降的生产者（背压）

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

struct QueueState<T> {
    items: VecDeque<T>,
    stopped: bool,
}

pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
    drained: Condvar,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                stopped: false,
            }),
            available: Condvar::new(),
            drained: Condvar::new(),
        }
    }

    /// 入队到队尾并唤醒一个消费者，返回入队后的深度
    ///
    /// 停止后拒绝入队，原样返回该元素。停止标志与队列共用同一把锁，
    /// 因此被接受的元素一定会在消费者退出前被取走。
    pub fn push(&self, item: T) -> Result<usize, T> {
        let depth = {
            let mut state = self.state.lock();
            if state.stopped {
                return Err(item);
            }
            state.items.push_back(item);
            state.items.len()
        };
        self.available.notify_one();
        Ok(depth)
    }

    /// 阻塞直到取到队首元素
    ///
    /// 只有在已停止且队列为空时才返回 None：停止前入队的元素总是先被取完。
    pub fn pop(&self) -> Option<T> {
        let item = {
            let mut state = self.state.lock();
            loop {
                if let Some(item) = state.items.pop_front() {
                    break item;
                }
                if state.stopped {
                    return None;
                }
                self.available.wait(&mut state);
            }
        };
        self.drained.notify_all();
        Some(item)
    }

    /// 当前驻留的元素数
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// 设置停止标志并唤醒所有消费者。返回 false 表示之前已经停止
    pub fn stop(&self) -> bool {
        let first = {
            let mut state = self.state.lock();
            !std::mem::replace(&mut state.stopped, true)
        };
        self.available.notify_all();
        first
    }

    /// 阻塞直到队列深度 <= threshold，返回被唤醒时的深度
    pub fn wait_until_len_at_most(&self, threshold: usize) -> usize {
        let mut state = self.state.lock();
        while state.items.len() > threshold {
            self.drained.wait(&mut state);
        }
        state.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = WorkQueue::new();
        for i in 0..5 {
            assert_eq!(queue.push(i).unwrap(), i + 1);
        }
        let popped: Vec<_> = (0..5).filter_map(|_| queue.pop()).collect();
        assert_eq!(popped, vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_stop_drains_before_returning_none() {
        let queue = WorkQueue::new();
        queue.push("a").unwrap();
        queue.push("b").unwrap();
        assert!(queue.stop());
        assert!(!queue.stop());

        assert_eq!(queue.pop(), Some("a"));
        assert_eq!(queue.pop(), Some("b"));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_push_rejected_after_stop() {
        let queue = WorkQueue::new();
        queue.stop();
        assert_eq!(queue.push(7), Err(7));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = Arc::new(WorkQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };
        thread::sleep(Duration::from_millis(50));
        queue.push(42).unwrap();
        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    #[test]
    fn test_stop_wakes_idle_consumers() {
        let queue: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::new());
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.pop())
            })
            .collect();
        thread::sleep(Duration::from_millis(50));
        queue.stop();
        for consumer in consumers {
            assert_eq!(consumer.join().unwrap(), None);
        }
    }

    #[test]
    fn test_wait_until_len_at_most() {
        let queue = Arc::new(WorkQueue::new());
        for i in 0..4 {
            queue.push(i).unwrap();
        }
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_until_len_at_most(1))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        queue.pop();
        queue.pop();
        queue.pop();
        assert_eq!(waiter.join().unwrap(), 1);
    }

    #[test]
    fn test_concurrent_producers_and_consumers_no_loss() {
        let queue = Arc::new(WorkQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..250 {
                        queue.push(p * 1000 + i).unwrap();
                    }
                })
            })
            .collect();
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(item) = queue.pop() {
                        seen.push(item);
                    }
                    seen
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        queue.stop();

        let mut all: Vec<_> = consumers.into_iter().flat_map(|c| c.join().unwrap()).collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }
}

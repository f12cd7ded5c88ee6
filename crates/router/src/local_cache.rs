//! 生产者本地缓存
//!
//! 每个生产者对应一个 `LocalCache`。生产者回调把批次推入共享的
//! 无锁入口队列 (`Ingress`)，由分发任务统一取出。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use contracts::{AdapterId, Measurement, MeasurementCallback, MeasurementSource};
use crossbeam::queue::SegQueue;
use tracing::{debug, trace};

use crate::metrics::RouterMetrics;
use crate::scheduled::WorkerHandle;

/// 共享入口队列
///
/// 多个生产者并发写入，只有分发任务读取。
#[derive(Debug)]
pub struct Ingress {
    queue: SegQueue<Vec<Measurement>>,
    /// 队列中的测量总数 (不是批次数)
    pending: AtomicUsize,
    max_pending: usize,
}

impl Ingress {
    pub fn new(max_pending: usize) -> Self {
        Self {
            queue: SegQueue::new(),
            pending: AtomicUsize::new(0),
            max_pending,
        }
    }

    /// 入队一个批次，积压超过阈值时返回 true
    ///
    /// 先计数再入队：批次被取出 (`pop` 减计数) 之前一定已经计入，
    /// 计数不会低于零。
    pub fn push(&self, batch: Vec<Measurement>) -> bool {
        let len = batch.len();
        let pending = self.pending.fetch_add(len, Ordering::AcqRel) + len;
        self.queue.push(batch);
        pending > self.max_pending
    }

    /// 出队一个批次
    pub fn pop(&self) -> Option<Vec<Measurement>> {
        let batch = self.queue.pop()?;
        self.pending.fetch_sub(batch.len(), Ordering::AcqRel);
        Some(batch)
    }

    /// 当前积压的测量数
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// 生产者本地缓存
///
/// 禁用后到达的批次直接丢弃：生产者取消订阅后仍可能有回调在途。
pub struct LocalCache {
    /// `None` 表示直接注入 (RoutingTable::inject)
    producer: Option<AdapterId>,
    enabled: AtomicBool,
    ingress: Arc<Ingress>,
    wake: WorkerHandle,
    metrics: Arc<RouterMetrics>,
}

impl LocalCache {
    /// 创建新的本地缓存
    pub fn new(
        producer: Option<AdapterId>,
        ingress: Arc<Ingress>,
        wake: WorkerHandle,
        metrics: Arc<RouterMetrics>,
    ) -> Self {
        Self {
            producer,
            enabled: AtomicBool::new(true),
            ingress,
            wake,
            metrics,
        }
    }

    /// 接收一个批次
    ///
    /// 空批次和禁用后的批次被忽略。积压过大时提前唤醒分发任务，
    /// 否则等待下一个周期。
    pub fn route(&self, batch: Vec<Measurement>) {
        if batch.is_empty() || !self.is_enabled() {
            return;
        }

        trace!(producer = ?self.producer, measurements = batch.len(), "batch received");

        if self.ingress.push(batch) {
            self.metrics.inc_eager_wakes();
            observability::metrics::record_eager_wake();
            self.wake.start();
        }
    }

    /// 停止接收
    pub fn disable(&self) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            debug!(producer = ?self.producer, "local cache disabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// 生成交给生产者的回调
    pub fn callback(self: &Arc<Self>) -> MeasurementCallback {
        let cache = Arc::clone(self);
        Arc::new(move |batch| cache.route(batch))
    }
}

/// 已注册的生产者
pub struct ProducerEntry {
    pub cache: Arc<LocalCache>,
    pub source: Arc<dyn MeasurementSource>,
}

impl ProducerEntry {
    /// 订阅生产者并返回注册项
    pub fn attach(source: Arc<dyn MeasurementSource>, cache: Arc<LocalCache>) -> Self {
        source.subscribe(cache.callback());
        Self { cache, source }
    }

    /// 先禁用缓存，再取消订阅
    pub fn detach(&self) {
        self.cache.disable();
        self.source.unsubscribe();
    }
}

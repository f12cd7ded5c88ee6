//! 路由指标收集模块
//!
//! 通过 `metrics` facade 记录路由表运行指标，并在内存中聚合采样统计。

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// 注册指标描述 (Prometheus HELP 文本)
pub fn describe_metrics() {
    describe_counter!(
        "measurement_router_cycles_total",
        "Completed dispatch cycles"
    );
    describe_counter!(
        "measurement_router_input_measurements_total",
        "Measurements drained from the ingress queue"
    );
    describe_counter!(
        "measurement_router_output_measurements_total",
        "Measurements copied to consumer buffers"
    );
    describe_counter!(
        "measurement_router_eager_wakes_total",
        "Dispatch runs triggered by ingress backlog"
    );
    describe_counter!(
        "measurement_router_delivered_measurements_total",
        "Measurements delivered per consumer"
    );
    describe_gauge!(
        "measurement_router_pending_measurements",
        "Measurements waiting in the ingress queue"
    );
    describe_gauge!("measurement_router_topology_version", "Current topology version");
    describe_histogram!(
        "measurement_router_cycle_batches",
        "Batches drained per dispatch cycle"
    );
}

/// 记录一次分发周期
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_dispatch_cycle;
///
/// record_dispatch_cycle(batches, input, output);
/// ```
pub fn record_dispatch_cycle(batches: usize, input: usize, output: usize) {
    counter!("measurement_router_cycles_total").increment(1);

    if batches == 0 {
        return;
    }

    histogram!("measurement_router_cycle_batches").record(batches as f64);
    counter!("measurement_router_input_batches_total").increment(batches as u64);
    counter!("measurement_router_input_measurements_total").increment(input as u64);
    counter!("measurement_router_output_measurements_total").increment(output as u64);
}

/// 记录提前唤醒
pub fn record_eager_wake() {
    counter!("measurement_router_eager_wakes_total").increment(1);
}

/// 记录入口队列积压
pub fn record_pending(pending: usize) {
    gauge!("measurement_router_pending_measurements").set(pending as f64);
}

/// 记录一次成功投递
pub fn record_batch_delivered(consumer: &str, measurements: usize) {
    counter!(
        "measurement_router_delivered_batches_total",
        "consumer" => consumer.to_string()
    )
    .increment(1);
    counter!(
        "measurement_router_delivered_measurements_total",
        "consumer" => consumer.to_string()
    )
    .increment(measurements as u64);
}

/// 记录拓扑变更
pub fn record_topology(version: u64, routes: usize, consumers: usize, producers: usize) {
    gauge!("measurement_router_topology_version").set(version as f64);
    gauge!("measurement_router_routes").set(routes as f64);
    gauge!("measurement_router_consumers").set(consumers as f64);
    gauge!("measurement_router_producers").set(producers as f64);
}

/// 路由采样聚合器
///
/// 定期采样路由表计数器，统计吞吐和积压。
#[derive(Debug, Clone, Default)]
pub struct RoutingStatsAggregator {
    /// 采样次数
    pub samples: u64,

    /// 输入速率 (测量/秒)
    pub input_rate: RunningStats,

    /// 输出速率 (测量/秒)
    pub output_rate: RunningStats,

    /// 入口积压
    pub pending: RunningStats,
}

impl RoutingStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一个采样
    ///
    /// `input_delta`/`output_delta` 为距上次采样的增量，`elapsed_secs`
    /// 为采样间隔。
    pub fn update(&mut self, elapsed_secs: f64, input_delta: u64, output_delta: u64, pending: usize) {
        self.samples += 1;
        self.pending.push(pending as f64);

        if elapsed_secs > 0.0 {
            self.input_rate.push(input_delta as f64 / elapsed_secs);
            self.output_rate.push(output_delta as f64 / elapsed_secs);
        }
    }

    /// 生成摘要
    pub fn summary(&self) -> RoutingStatsSummary {
        RoutingStatsSummary {
            samples: self.samples,
            input_rate: StatsSummary::from(&self.input_rate),
            output_rate: StatsSummary::from(&self.output_rate),
            pending: StatsSummary::from(&self.pending),
        }
    }
}

/// 采样摘要
#[derive(Debug, Clone, Default)]
pub struct RoutingStatsSummary {
    pub samples: u64,
    pub input_rate: StatsSummary,
    pub output_rate: StatsSummary,
    pub pending: StatsSummary,
}

impl std::fmt::Display for RoutingStatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Samples: {}", self.samples)?;
        writeln!(f, "Input rate (/s): {}", self.input_rate)?;
        writeln!(f, "Output rate (/s): {}", self.output_rate)?;
        write!(f, "Pending measurements: {}", self.pending)
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1} (n={})",
                self.min, self.max, self.mean, self.count
            )
        }
    }
}

/// 在线统计 (增量均值)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
            self.mean += (value - self.mean) / self.count as f64;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

//! RouterBlueprint - Config Loader 输出
//!
//! 描述完整的路由配置：路由表参数、生产者、消费者。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use crate::SignalId;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的路由配置蓝图
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct RouterBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 路由表参数
    #[serde(default)]
    #[validate(nested)]
    pub router: RouterSettings,

    /// 生产者定义列表
    #[serde(default)]
    #[validate(nested)]
    pub producers: Vec<ProducerConfig>,

    /// 消费者定义列表
    #[serde(default)]
    #[validate(nested)]
    pub consumers: Vec<ConsumerConfig>,
}

/// 路由表参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RouterSettings {
    /// 分发周期 (毫秒)，必须在 [1, 500] 之间
    #[serde(default = "default_dispatch_latency_ms")]
    #[validate(range(min = 1, max = 500))]
    pub dispatch_latency_ms: u64,

    /// 积压测量数超过该值时提前唤醒分发
    #[serde(default = "default_max_pending")]
    #[validate(range(min = 1))]
    pub max_pending_before_eager_wake: usize,

    /// 单个消费者累积缓冲达到该值时立即 flush
    #[serde(default = "default_flush_threshold")]
    #[validate(range(min = 1))]
    pub flush_threshold: usize,

    /// 每隔多少个分发周期输出一次状态消息
    #[serde(default = "default_status_interval")]
    #[validate(range(min = 1))]
    pub status_interval_cycles: u64,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            dispatch_latency_ms: default_dispatch_latency_ms(),
            max_pending_before_eager_wake: default_max_pending(),
            flush_threshold: default_flush_threshold(),
            status_interval_cycles: default_status_interval(),
        }
    }
}

impl RouterSettings {
    /// 使用指定分发周期，其余参数取默认值
    pub fn with_latency(dispatch_latency_ms: u64) -> Self {
        Self {
            dispatch_latency_ms,
            ..Default::default()
        }
    }
}

fn default_dispatch_latency_ms() -> u64 {
    10
}

fn default_max_pending() -> usize {
    1000
}

fn default_flush_threshold() -> usize {
    1000
}

fn default_status_interval() -> u64 {
    1000
}

/// 生产者配置 (模拟测量源)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProducerConfig {
    /// 唯一标识符
    #[validate(length(min = 1))]
    pub id: String,

    /// 产生的信号列表
    #[validate(length(min = 1))]
    pub signals: Vec<SignalId>,

    /// 发送频率 (Hz)，必须 > 0
    #[serde(default = "default_rate_hz")]
    #[validate(range(exclusive_min = 0.0))]
    pub rate_hz: f64,

    /// 每次发送的测量数
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: usize,
}

fn default_rate_hz() -> f64 {
    10.0
}

fn default_batch_size() -> usize {
    1
}

/// 消费者输出配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConsumerConfig {
    /// 消费者名称 (唯一)
    #[validate(length(min = 1))]
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 订阅的信号 (省略 = 广播消费者)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<Vec<SignalId>>,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl ConsumerConfig {
    /// 是否为广播消费者
    pub fn is_broadcast(&self) -> bool {
        self.signals.is_none()
    }
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 日志输出
    Log,
    /// 文件输出 (JSON lines)
    File,
}

impl RouterBlueprint {
    /// 所有生产者产生的信号 (去重, 有序)
    pub fn produced_signals(&self) -> Vec<SignalId> {
        let mut signals: Vec<SignalId> = self
            .producers
            .iter()
            .flat_map(|p| p.signals.iter().cloned())
            .collect();
        signals.sort();
        signals.dedup();
        signals
    }

    /// 消费者订阅但没有任何生产者产生的信号
    pub fn unproduced_subscriptions(&self) -> Vec<(String, SignalId)> {
        let produced = self.produced_signals();
        self.consumers
            .iter()
            .filter_map(|c| c.signals.as_ref().map(|s| (c, s)))
            .flat_map(|(c, signals)| {
                signals
                    .iter()
                    .filter(|s| produced.binary_search(s).is_err())
                    .map(|s| (c.name.clone(), s.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

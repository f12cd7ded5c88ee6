//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置到路由表的完整链路
//! - 运行中的拓扑变更
//! - 消费者故障隔离与关闭语义

#[cfg(test)]
mod contract_tests {
    use contracts::{Measurement, RouterBlueprint, RouterSettings};

    #[test]
    fn test_default_blueprint_is_valid() {
        let blueprint = RouterBlueprint::default();
        assert!(config_loader::ConfigLoader::validate(&blueprint).is_ok());
        assert_eq!(blueprint.router, RouterSettings::default());
    }

    #[test]
    fn test_measurement_line_format() {
        let line = serde_json::to_string(&Measurement::new("PPA:1", 1.5, 2.0)).unwrap();
        assert_eq!(line, r#"{"signal_id":"PPA:1","value":1.5,"timestamp":2.0}"#);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{ContractError, Measurement, MeasurementSink, SignalId};
    use parking_lot::Mutex;
    use router::sinks::CountingSink;
    use router::sources::{MockMeasurementSource, MockSourceConfig};
    use router::{RouterError, RoutingTable, TopologyPatch};
    use tokio::time::sleep;

    fn signals(s: &[&str]) -> Option<Vec<SignalId>> {
        Some(s.iter().map(|x| SignalId::from(*x)).collect())
    }

    fn read_lines(path: &std::path::Path) -> Vec<Measurement> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    /// Sink that rejects every batch
    struct FailingSink;

    impl MeasurementSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn input_signals(&self) -> Option<Vec<SignalId>> {
            None
        }

        async fn deliver(&mut self, _batch: &[Measurement]) -> Result<(), ContractError> {
            Err(ContractError::sink_deliver("failing", "downstream unavailable"))
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    /// End-to-end: TOML config -> RoutingTable -> mock producers -> file sinks
    ///
    /// 验证：
    /// 1. 过滤消费者只收到订阅的信号
    /// 2. 广播消费者收到所有信号
    /// 3. dispose 之后文件内容完整
    #[tokio::test]
    async fn test_e2e_config_to_file_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().display().to_string().replace('\\', "/");
        let config = format!(
            r#"
[router]
dispatch_latency_ms = 5

[[producers]]
id = "pmu_1"
signals = ["PPA:1", "PPA:2"]
rate_hz = 100.0
batch_size = 2

[[producers]]
id = "pmu_2"
signals = ["PPB:1"]
rate_hz = 100.0

[[consumers]]
name = "historian"
sink_type = "file"
signals = ["PPA:1"]
[consumers.params]
base_path = "{base}"

[[consumers]]
name = "archive"
sink_type = "file"
[consumers.params]
base_path = "{base}"
"#
        );

        let blueprint = ConfigLoader::load_from_str(&config, ConfigFormat::Toml).unwrap();
        let table = RoutingTable::new(blueprint.router.clone()).unwrap();
        let version = table
            .patch(TopologyPatch::from_blueprint(&blueprint).unwrap())
            .unwrap();

        assert_eq!(version, 1);
        assert_eq!(table.producer_count(), 2);
        assert_eq!(table.consumer_count(), 2);

        sleep(Duration::from_millis(300)).await;
        table.dispose().await;

        let historian = read_lines(&dir.path().join("historian.jsonl"));
        let archive = read_lines(&dir.path().join("archive.jsonl"));

        assert!(!historian.is_empty());
        assert!(historian.iter().all(|m| m.signal_id == "PPA:1"));
        for signal in ["PPA:1", "PPA:2", "PPB:1"] {
            assert!(archive.iter().any(|m| m.signal_id == signal), "missing {signal}");
        }

        let metrics = table.metrics();
        assert_eq!(
            metrics.output_measurements as usize,
            historian.len() + archive.len()
        );
    }

    /// 运行中增删消费者：被移除的消费者不再收到数据，新增的消费者开始收到数据
    #[tokio::test]
    async fn test_patch_during_traffic() {
        let table = RoutingTable::with_latency(5).unwrap();
        let source = Arc::new(MockMeasurementSource::new(
            "pmu",
            MockSourceConfig {
                signals: vec!["A".into(), "B".into()],
                rate_hz: 200.0,
                batch_size: 1,
            },
        )
        .unwrap());

        let (first, first_log) = CountingSink::new("first", signals(&["A"]));
        table
            .patch(TopologyPatch::new().add_producer(source.clone()).add_consumer(first))
            .unwrap();
        sleep(Duration::from_millis(150)).await;

        let (second, second_log) = CountingSink::new("second", None);
        let version = table
            .patch(
                TopologyPatch::new()
                    .remove_consumer("first")
                    .add_consumer(second),
            )
            .unwrap();
        assert_eq!(version, 2);

        // Let anything flushed before the swap land
        sleep(Duration::from_millis(50)).await;
        let first_total = first_log.total();
        assert!(first_total > 0);
        assert_eq!(first_log.count_for("B"), 0);

        sleep(Duration::from_millis(150)).await;
        table.dispose().await;

        assert_eq!(first_log.total(), first_total);
        assert_eq!(first_log.close_count(), 1);
        assert!(second_log.count_for("A") > 0);
        assert!(second_log.count_for("B") > 0);
        assert_eq!(second_log.close_count(), 1);
        assert!(source.sent() > 0);
    }

    /// 多个生产者线程并发写入：不丢失、不重复，每个线程内部保持顺序
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_producers() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 2_000;

        let mut settings = contracts::RouterSettings::with_latency(5);
        settings.max_pending_before_eager_wake = 500;
        let table = Arc::new(RoutingTable::new(settings).unwrap());
        let (sink, log) = CountingSink::new("subscriber", signals(&["A"]));
        table.patch(TopologyPatch::new().add_consumer(sink)).unwrap();

        let producers: Vec<_> = (0..THREADS)
            .map(|thread| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    for seq in 0..PER_THREAD {
                        // timestamp carries the thread, value the sequence
                        table.inject(vec![Measurement::new("A", seq as f64, thread as f64)]);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        table.dispose().await;

        assert_eq!(log.total(), THREADS * PER_THREAD);
        let mut next = vec![0.0; THREADS];
        for m in log.batches().into_iter().flatten() {
            let thread = m.timestamp as usize;
            assert_eq!(m.value, next[thread], "thread {thread} out of order");
            next[thread] += 1.0;
        }
        assert!(next.iter().all(|n| *n == PER_THREAD as f64));
        assert_eq!(table.pending_measurements(), 0);
    }

    /// 单个消费者失败不影响其他消费者
    #[tokio::test]
    async fn test_failing_consumer_is_isolated() {
        let table = RoutingTable::with_latency(5).unwrap();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink_errors = errors.clone();
        table.initialize(
            Arc::new(|_: &str| {}),
            Arc::new(move |err: &RouterError| sink_errors.lock().push(err.to_string())),
        );

        let (healthy, log) = CountingSink::new("healthy", None);
        table
            .patch(TopologyPatch::new().add_consumer(FailingSink).add_consumer(healthy))
            .unwrap();

        for i in 0..10 {
            table.inject(vec![Measurement::new("A", i as f64, i as f64)]);
            sleep(Duration::from_millis(10)).await;
        }
        sleep(Duration::from_millis(50)).await;

        assert_eq!(log.total(), 10);
        let values: Vec<f64> = log.batches().into_iter().flatten().map(|m| m.value).collect();
        assert_eq!(values, (0..10).map(|i| i as f64).collect::<Vec<_>>());

        let failing = table
            .consumer_metrics()
            .into_iter()
            .find(|(id, _)| id == "failing")
            .map(|(_, metrics)| metrics)
            .unwrap();
        assert!(failing.failure_count > 0);
        assert_eq!(failing.delivered_batches, 0);
        assert!(errors.lock().iter().any(|e| e.contains("downstream unavailable")));

        table.dispose().await;
    }

    /// 状态回调按周期触发
    #[tokio::test]
    async fn test_status_messages() {
        let mut settings = contracts::RouterSettings::with_latency(5);
        settings.status_interval_cycles = 2;
        let table = RoutingTable::new(settings).unwrap();

        let statuses = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = statuses.clone();
        table.initialize(
            Arc::new(move |message: &str| sink.lock().push(message.to_string())),
            Arc::new(|_: &RouterError| {}),
        );

        sleep(Duration::from_millis(100)).await;
        table.dispose().await;

        let statuses = statuses.lock();
        assert!(!statuses.is_empty());
        assert!(statuses
            .iter()
            .all(|s| s.starts_with("Routing cycles: ") && s.contains("input batches: 0")));
    }

    /// 高积压时提前唤醒，并且每个批次不超过 flush 阈值
    #[tokio::test]
    async fn test_burst_respects_flush_threshold() {
        let mut settings = contracts::RouterSettings::with_latency(500);
        settings.max_pending_before_eager_wake = 100;
        settings.flush_threshold = 250;
        let table = RoutingTable::new(settings).unwrap();

        let (sink, log) = CountingSink::new("bulk", None);
        table.patch(TopologyPatch::new().add_consumer(sink)).unwrap();

        table.inject(
            (0..1000)
                .map(|i| Measurement::new("A", i as f64, 0.0))
                .collect(),
        );
        sleep(Duration::from_millis(100)).await;

        assert_eq!(log.total(), 1000);
        assert!(log.batches().iter().all(|b| b.len() <= 250));
        assert!(table.metrics().eager_wakes >= 1);

        table.dispose().await;
    }
}

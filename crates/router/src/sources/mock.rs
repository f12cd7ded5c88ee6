//! Mock measurement source
//!
//! Implements `MeasurementSource`, emitting simulated measurements from a
//! background thread. Used for demos and tests without a real device.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use contracts::{
    AdapterId, ContractError, Measurement, MeasurementCallback, MeasurementSource,
    ProducerConfig, SignalId,
};
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Mock source configuration
#[derive(Debug, Clone)]
pub struct MockSourceConfig {
    /// Signals cycled through when building a batch
    pub signals: Vec<SignalId>,
    /// Send frequency (Hz)
    pub rate_hz: f64,
    /// Measurements per batch
    pub batch_size: usize,
}

impl Default for MockSourceConfig {
    fn default() -> Self {
        Self {
            signals: vec![SignalId::from("mock")],
            rate_hz: 10.0,
            batch_size: 1,
        }
    }
}

impl From<&ProducerConfig> for MockSourceConfig {
    fn from(config: &ProducerConfig) -> Self {
        Self {
            signals: config.signals.clone(),
            rate_hz: config.rate_hz,
            batch_size: config.batch_size,
        }
    }
}

impl MockSourceConfig {
    /// Pause between two batches
    ///
    /// # Errors
    /// The rate is not a positive finite number, or is too small for the
    /// interval to be represented.
    pub fn interval(&self) -> Result<Duration, String> {
        if !(self.rate_hz.is_finite() && self.rate_hz > 0.0) {
            return Err(format!("rate_hz must be positive, got {}", self.rate_hz));
        }
        Duration::try_from_secs_f64(1.0 / self.rate_hz)
            .map_err(|e| format!("rate_hz {} out of range: {e}", self.rate_hz))
    }
}

/// Subscription state; every subscribe and unsubscribe starts a new generation
#[derive(Debug, Default)]
struct Subscription {
    active: bool,
    generation: u64,
}

/// Mock measurement source
///
/// Each batch holds `batch_size` measurements per signal, valued along a
/// slow sine wave and stamped with the wall clock.
pub struct MockMeasurementSource {
    id: AdapterId,
    config: MockSourceConfig,
    interval: Duration,
    subscription: Mutex<Subscription>,
    /// Generation the emitter thread must match to keep running
    current: Arc<AtomicU64>,
    sent: Arc<AtomicU64>,
}

impl MockMeasurementSource {
    /// Create new mock source
    ///
    /// # Errors
    /// `ContractError::Source` when `rate_hz` is not usable.
    pub fn new(id: impl Into<AdapterId>, config: MockSourceConfig) -> Result<Self, ContractError> {
        let id = id.into();
        let interval = config
            .interval()
            .map_err(|message| ContractError::source(id.as_str(), message))?;

        Ok(Self {
            id,
            config,
            interval,
            subscription: Mutex::new(Subscription::default()),
            current: Arc::new(AtomicU64::new(0)),
            sent: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Create a source from a producer definition
    pub fn from_config(config: &ProducerConfig) -> Result<Self, ContractError> {
        Self::new(config.id.as_str(), MockSourceConfig::from(config))
    }

    /// Total measurements emitted so far
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    fn generate_batch(config: &MockSourceConfig, sequence: u64) -> Vec<Measurement> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        let mut batch = Vec::with_capacity(config.signals.len() * config.batch_size);
        for i in 0..config.batch_size {
            let step = (sequence * config.batch_size as u64 + i as u64) as f64;
            for (offset, signal) in config.signals.iter().enumerate() {
                let value = (step * 0.1 + offset as f64).sin();
                batch.push(Measurement::new(signal.clone(), value, timestamp));
            }
        }
        batch
    }
}

impl MeasurementSource for MockMeasurementSource {
    fn source_id(&self) -> &AdapterId {
        &self.id
    }

    fn subscribe(&self, callback: MeasurementCallback) {
        let generation = {
            let mut subscription = self.subscription.lock();
            // Idempotent: if already subscribed, don't start again
            if subscription.active {
                return;
            }
            subscription.active = true;
            subscription.generation += 1;
            self.current.store(subscription.generation, Ordering::SeqCst);
            subscription.generation
        };

        let id = self.id.clone();
        let config = self.config.clone();
        let interval = self.interval;
        let current = Arc::clone(&self.current);
        let sent = Arc::clone(&self.sent);

        thread::spawn(move || {
            debug!(producer = %id, generation, rate_hz = config.rate_hz, "mock source started");

            let mut sequence: u64 = 0;
            while current.load(Ordering::SeqCst) == generation {
                let batch = Self::generate_batch(&config, sequence);
                let len = batch.len();
                callback(batch);
                sent.fetch_add(len as u64, Ordering::Relaxed);

                trace!(producer = %id, sequence, measurements = len, "mock batch sent");

                sequence += 1;
                thread::sleep(interval);
            }

            debug!(producer = %id, generation, "mock source stopped");
        });
    }

    fn unsubscribe(&self) {
        let mut subscription = self.subscription.lock();
        if subscription.active {
            subscription.active = false;
            subscription.generation += 1;
            self.current.store(subscription.generation, Ordering::SeqCst);
        }
    }

    fn is_subscribed(&self) -> bool {
        self.subscription.lock().active
    }
}

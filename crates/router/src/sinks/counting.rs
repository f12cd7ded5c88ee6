//! CountingSink - keeps every delivered batch in memory

use std::sync::Arc;

use contracts::{ContractError, Measurement, MeasurementSink, SignalId};
use parking_lot::Mutex;

/// Shared view of what a `CountingSink` received
#[derive(Debug, Clone, Default)]
pub struct DeliveryLog {
    batches: Arc<Mutex<Vec<Vec<Measurement>>>>,
    closed: Arc<Mutex<u32>>,
}

impl DeliveryLog {
    /// Copies of all delivered batches, in delivery order
    pub fn batches(&self) -> Vec<Vec<Measurement>> {
        self.batches.lock().clone()
    }

    /// Number of delivered batches
    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }

    /// Total delivered measurements
    pub fn total(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }

    /// Delivered measurements for one signal
    pub fn count_for(&self, signal: &str) -> usize {
        self.batches
            .lock()
            .iter()
            .flatten()
            .filter(|m| m.signal_id == signal)
            .count()
    }

    /// How many times `close` was called
    pub fn close_count(&self) -> u32 {
        *self.closed.lock()
    }
}

/// In-memory sink
pub struct CountingSink {
    name: String,
    signals: Option<Vec<SignalId>>,
    log: DeliveryLog,
}

impl CountingSink {
    /// Create a sink and the log it records into
    pub fn new(name: impl Into<String>, signals: Option<Vec<SignalId>>) -> (Self, DeliveryLog) {
        let log = DeliveryLog::default();
        let sink = Self {
            name: name.into(),
            signals,
            log: log.clone(),
        };
        (sink, log)
    }
}

impl MeasurementSink for CountingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_signals(&self) -> Option<Vec<SignalId>> {
        self.signals.clone()
    }

    async fn deliver(&mut self, batch: &[Measurement]) -> Result<(), ContractError> {
        self.log.batches.lock().push(batch.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        *self.log.closed.lock() += 1;
        Ok(())
    }
}

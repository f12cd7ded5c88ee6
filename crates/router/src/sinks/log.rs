//! LogSink - logs batch summaries via tracing

use contracts::{ContractError, Measurement, MeasurementSink, SignalId};
use tracing::{info, instrument};

/// Sink that logs batch summaries for debugging
pub struct LogSink {
    name: String,
    signals: Option<Vec<SignalId>>,
    batches: u64,
}

impl LogSink {
    /// Create a new LogSink; `None` subscribes to every signal
    pub fn new(name: impl Into<String>, signals: Option<Vec<SignalId>>) -> Self {
        Self {
            name: name.into(),
            signals,
            batches: 0,
        }
    }

    fn log_batch_summary(&self, batch: &[Measurement]) {
        let first = batch.first().map(|m| m.timestamp);
        let last = batch.last().map(|m| m.timestamp);

        info!(
            sink = %self.name,
            batch = self.batches,
            measurements = batch.len(),
            first_timestamp = ?first,
            last_timestamp = ?last,
            "Batch received"
        );
    }
}

impl MeasurementSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_signals(&self) -> Option<Vec<SignalId>> {
        self.signals.clone()
    }

    #[instrument(
        name = "log_sink_deliver",
        skip(self, batch),
        fields(sink = %self.name, measurements = batch.len())
    )]
    async fn deliver(&mut self, batch: &[Measurement]) -> Result<(), ContractError> {
        self.batches += 1;
        self.log_batch_summary(batch);
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, batches = self.batches, "LogSink closed");
        Ok(())
    }
}

//! MeasurementSink trait - consumer side of the routing table

use crate::{ContractError, Measurement, SignalId};

/// Consumer adapter
///
/// Each sink is driven by its own worker; `deliver` is called with one
/// batch at a time, in the order the batches were queued.
#[trait_variant::make(MeasurementSink: Send)]
pub trait LocalMeasurementSink {
    /// Sink name (used as the consumer id, in logs and in metrics)
    fn name(&self) -> &str;

    /// Signals this sink wants to receive
    ///
    /// `None` makes the sink a broadcast consumer that receives every
    /// measurement. `Some(vec![])` receives nothing.
    fn input_signals(&self) -> Option<Vec<SignalId>>;

    /// Deliver an ordered batch
    ///
    /// # Errors
    /// Returns deliver error (should include context)
    async fn deliver(&mut self, batch: &[Measurement]) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}

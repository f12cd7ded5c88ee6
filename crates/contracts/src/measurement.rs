//! Measurement - the unit routed between producers and consumers

use serde::{Deserialize, Serialize};

use crate::SignalId;

/// A single timestamped, identified data point.
///
/// Immutable once produced. The router only looks at `signal_id`; value and
/// timestamp pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Routing key
    pub signal_id: SignalId,

    /// Measured value
    pub value: f64,

    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

impl Measurement {
    /// Create a new measurement
    pub fn new(signal_id: impl Into<SignalId>, value: f64, timestamp: f64) -> Self {
        Self {
            signal_id: signal_id.into(),
            value,
            timestamp,
        }
    }
}

//! # Router
//!
//! High-fan-out measurement routing table.
//!
//! Producers push measurement batches into a lock-free ingress queue. A
//! periodic dispatch worker drains it, looks up each measurement's signal in
//! an immutable routing snapshot, and appends it to the accumulation buffer
//! of every subscribed consumer (broadcast consumers receive everything).
//! Buffers are handed to per-consumer delivery workers, so a slow consumer
//! only delays itself.
//!
//! Topology changes (`RoutingTable::patch`) build a complete replacement
//! snapshot and swap it in atomically.

mod consumer;
mod diagnostics;
mod dispatch;
mod error;
mod global_cache;
mod local_cache;
mod metrics;
mod patch;
mod scheduled;
mod table;

pub mod sinks;
pub mod sources;

pub use diagnostics::{Diagnostics, DiagnosticsHandle, ExceptionCallback, StatusCallback};
pub use error::RouterError;
pub use metrics::{ConsumerMetricsSnapshot, RouterMetricsSnapshot};
pub use patch::TopologyPatch;
pub use scheduled::{LocalWork, RunReason, ScheduledWorker, Work, WorkerHandle};
pub use table::RoutingTable;

// Re-export contracts for convenience
pub use contracts::{Measurement, MeasurementSink, MeasurementSource, RouterSettings, SignalId};

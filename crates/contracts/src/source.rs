//! MeasurementSource trait - producer side of the routing table
//!
//! Producers push batches through a callback, the same way a device driver
//! raises "new measurements" events. The routing table owns the callback and
//! decides whether a late event is still forwarded.

use std::sync::Arc;

use crate::{AdapterId, Measurement};

/// Batch callback handed to a producer on subscribe.
///
/// Uses `Arc` so producers can share the callback with their own worker
/// threads.
pub type MeasurementCallback = Arc<dyn Fn(Vec<Measurement>) + Send + Sync>;

/// Producer adapter
///
/// # Example
///
/// ```ignore
/// let source: Arc<dyn MeasurementSource> = Arc::new(MockMeasurementSource::new("pmu", config)?);
/// source.subscribe(Arc::new(|batch| {
///     println!("received {} measurements", batch.len());
/// }));
/// // ... later ...
/// source.unsubscribe();
/// ```
pub trait MeasurementSource: Send + Sync {
    /// Unique producer id
    fn source_id(&self) -> &AdapterId;

    /// Start emitting batches to `callback`.
    ///
    /// Repeated calls while subscribed should not register a second callback.
    fn subscribe(&self, callback: MeasurementCallback);

    /// Stop emitting batches.
    ///
    /// Events already in flight may still reach the previous callback.
    fn unsubscribe(&self);

    /// Check if currently subscribed
    fn is_subscribed(&self) -> bool;
}

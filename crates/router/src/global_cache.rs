//! GlobalCache - immutable routing snapshot
//!
//! Built once per topology change and swapped in atomically. The dispatch
//! loop loads a snapshot at the start of each cycle and uses it for the
//! whole cycle.

use std::collections::HashMap;
use std::sync::Arc;

use contracts::{AdapterId, SignalId};

use crate::consumer::Consumer;

/// Routing snapshot
///
/// Consumers are addressed by slot index. The dispatch loop keeps one
/// accumulation buffer per slot.
pub struct GlobalCache {
    version: u64,
    consumers: Vec<Arc<Consumer>>,
    /// Signal -> consumer slots; broadcast slots appended to every entry
    signal_lookup: HashMap<SignalId, Vec<usize>>,
    /// Slots of broadcast consumers, used for unmapped signals
    broadcast: Vec<usize>,
    destination_lookup: HashMap<AdapterId, usize>,
}

impl GlobalCache {
    /// Version 0, no consumers
    pub fn empty() -> Self {
        Self {
            version: 0,
            consumers: Vec::new(),
            signal_lookup: HashMap::new(),
            broadcast: Vec::new(),
            destination_lookup: HashMap::new(),
        }
    }

    /// Build a snapshot from the full consumer list
    pub fn build(consumers: Vec<Arc<Consumer>>, version: u64) -> Self {
        let mut signal_lookup: HashMap<SignalId, Vec<usize>> = HashMap::new();
        let mut broadcast = Vec::new();
        let mut destination_lookup = HashMap::with_capacity(consumers.len());

        for (slot, consumer) in consumers.iter().enumerate() {
            destination_lookup.insert(consumer.id().clone(), slot);

            match consumer.input_signals() {
                None => broadcast.push(slot),
                Some(signals) => {
                    for signal in signals {
                        signal_lookup.entry(signal.clone()).or_default().push(slot);
                    }
                }
            }
        }

        for slots in signal_lookup.values_mut() {
            slots.extend(broadcast.iter().copied());
        }

        Self {
            version,
            consumers,
            signal_lookup,
            broadcast,
            destination_lookup,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of distinct signals with an explicit mapping
    pub fn route_count(&self) -> usize {
        self.signal_lookup.len()
    }

    pub fn consumers(&self) -> &[Arc<Consumer>] {
        &self.consumers
    }

    /// Slots receiving `signal`; unmapped signals go to broadcast consumers
    pub fn destinations(&self, signal: &SignalId) -> &[usize] {
        self.signal_lookup
            .get(signal)
            .map(Vec::as_slice)
            .unwrap_or(&self.broadcast)
    }

    /// Look up a consumer by id
    pub fn consumer(&self, id: &str) -> Option<&Arc<Consumer>> {
        self.destination_lookup
            .get(id)
            .and_then(|slot| self.consumers.get(*slot))
    }

    pub fn contains_consumer(&self, id: &str) -> bool {
        self.destination_lookup.contains_key(id)
    }
}

impl Default for GlobalCache {
    fn default() -> Self {
        Self::empty()
    }
}

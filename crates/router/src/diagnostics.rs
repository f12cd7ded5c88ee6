//! Status and exception callbacks registered through `RoutingTable::initialize`

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{error, info};

use crate::error::RouterError;

/// Receives periodic status messages
pub type StatusCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Receives errors caught at a worker boundary, and the disposal notice
pub type ExceptionCallback = Arc<dyn Fn(&RouterError) + Send + Sync>;

/// Pair of diagnostic callbacks
#[derive(Clone)]
pub struct Diagnostics {
    on_status: StatusCallback,
    on_exception: ExceptionCallback,
}

impl Diagnostics {
    pub fn new(on_status: StatusCallback, on_exception: ExceptionCallback) -> Self {
        Self {
            on_status,
            on_exception,
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            on_status: Arc::new(|message| info!(target: "router::status", "{message}")),
            on_exception: Arc::new(|err| {
                if err.is_disposing() {
                    info!(target: "router::status", "Routing table disposing");
                } else {
                    error!(target: "router::status", error = %err, "Routing error");
                }
            }),
        }
    }
}

/// Shared handle to the current callbacks
///
/// Workers read it on every report, so `initialize` takes effect for
/// workers that are already running.
#[derive(Clone)]
pub struct DiagnosticsHandle {
    current: Arc<ArcSwap<Diagnostics>>,
}

impl Default for DiagnosticsHandle {
    fn default() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(Diagnostics::default())),
        }
    }
}

impl DiagnosticsHandle {
    /// Replace the callbacks
    pub fn replace(&self, diagnostics: Diagnostics) {
        self.current.store(Arc::new(diagnostics));
    }

    /// Raise a status message
    pub fn status(&self, message: &str) {
        (self.current.load().on_status)(message);
    }

    /// Raise an exception
    pub fn exception(&self, err: &RouterError) {
        (self.current.load().on_exception)(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_replace_redirects_reports() {
        let handle = DiagnosticsHandle::default();
        let clone = handle.clone();

        let statuses = Arc::new(Mutex::new(Vec::<String>::new()));
        let errors = Arc::new(Mutex::new(Vec::<String>::new()));

        let s = Arc::clone(&statuses);
        let e = Arc::clone(&errors);
        handle.replace(Diagnostics::new(
            Arc::new(move |m| s.lock().push(m.to_string())),
            Arc::new(move |err| e.lock().push(err.to_string())),
        ));

        // Clones share the same slot
        clone.status("cycles: 1000");
        clone.exception(&RouterError::Disposing);

        assert_eq!(statuses.lock().as_slice(), ["cycles: 1000"]);
        assert_eq!(errors.lock().as_slice(), ["routing table disposing"]);
    }
}

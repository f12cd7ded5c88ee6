//! Router error types

use thiserror::Error;

use contracts::ContractError;

/// Routing-table errors
#[derive(Debug, Error)]
pub enum RouterError {
    /// Rejected settings, raised at construction only
    #[error("invalid router configuration: {message}")]
    InvalidConfig { message: String },

    /// Producer or consumer id already registered
    #[error("adapter '{id}' is already registered")]
    DuplicateAdapter { id: String },

    /// A consumer's sink failed to accept a batch
    #[error("delivery to consumer '{consumer}' failed: {source}")]
    Delivery {
        consumer: String,
        #[source]
        source: ContractError,
    },

    /// A worker run panicked; the worker keeps running
    #[error("worker '{worker}' panicked: {message}")]
    WorkerPanic { worker: String, message: String },

    /// Informational: the routing table is shutting down
    #[error("routing table disposing")]
    Disposing,

    /// Construction outside a Tokio runtime
    #[error("routing table requires a running Tokio runtime")]
    NoRuntime,

    /// Operation attempted after dispose
    #[error("routing table has been disposed")]
    Disposed,

    /// Contract-level error
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),
}

impl RouterError {
    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a duplicate adapter error
    pub fn duplicate_adapter(id: impl Into<String>) -> Self {
        Self::DuplicateAdapter { id: id.into() }
    }

    /// Create a delivery error
    pub fn delivery(consumer: impl Into<String>, source: ContractError) -> Self {
        Self::Delivery {
            consumer: consumer.into(),
            source,
        }
    }

    /// Create a worker panic error
    pub fn worker_panic(worker: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WorkerPanic {
            worker: worker.into(),
            message: message.into(),
        }
    }

    /// Disposal notifications are not failures and need no restart
    pub fn is_disposing(&self) -> bool {
        matches!(self, Self::Disposing)
    }
}

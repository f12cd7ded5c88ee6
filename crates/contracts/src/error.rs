//! Layered error definitions
//!
//! Categorized by source: config / source / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Source Errors =====
    /// Producer adapter failed to emit or subscribe
    #[error("source '{source_id}' error: {message}")]
    Source { source_id: String, message: String },

    // ===== Sink Errors =====
    /// Consumer adapter rejected a batch
    #[error("sink '{sink_name}' deliver error: {message}")]
    SinkDeliver { sink_name: String, message: String },

    /// Consumer adapter failed to open or close its destination
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create source error
    pub fn source(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    /// Create sink deliver error
    pub fn sink_deliver(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkDeliver {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create sink connection error
    pub fn sink_connection(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkConnection {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}

//! Sink implementations
//!
//! Contains LogSink, FileSink, and CountingSink.

mod counting;
mod file;
mod log;

pub use self::counting::{CountingSink, DeliveryLog};
pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::LogSink;

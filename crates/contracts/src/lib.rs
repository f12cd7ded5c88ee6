//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace:
//! measurement data types, producer and consumer traits, configuration
//! blueprint, and the common error type.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Measurement timestamps are seconds since the Unix epoch (f64)
//! - The router never interprets timestamps; they pass through unchanged

mod blueprint;
mod error;
mod ids;
mod measurement;
mod sink;
mod source;

pub use blueprint::*;
pub use error::*;
pub use ids::{AdapterId, SignalId};
pub use measurement::Measurement;
pub use sink::*;
pub use source::{MeasurementCallback, MeasurementSource};

//! Routing session orchestration.

mod orchestrator;
mod stats;

pub use orchestrator::{Session, SessionConfig};
pub use stats::RunStats;

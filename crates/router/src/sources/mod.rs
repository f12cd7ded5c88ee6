//! Source implementations

mod mock;

pub use self::mock::{MockMeasurementSource, MockSourceConfig};

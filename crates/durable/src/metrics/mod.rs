//! Engine counters and runtime health reporting

mod engine;
mod runtime;

pub use engine::{EngineMetrics, EngineMetricsSnapshot};
pub use runtime::{RuntimeMetricsReporter, RuntimeSample};

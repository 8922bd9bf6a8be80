//! Host metrics
//!
//! A fixed battery of shell probes runs against every host on an interval;
//! their output is parsed into one [`MetricSample`] per host per tick.

mod collector;
pub mod probes;
mod sample;

pub use collector::{
    CollectionOutcome, CollectorConfig, MIN_COLLECT_INTERVAL_SECS, MetricsCollector,
};
pub use probes::{CpuSnapshot, Probe};
pub use sample::{MetricSample, NetworkRate};

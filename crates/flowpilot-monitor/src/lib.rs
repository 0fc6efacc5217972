//! # FlowPilot Monitor
//!
//! Counters and gauges for execution activity, exported in Prometheus text
//! format, plus the [`PipelineMetrics`] collector the execution pipeline
//! notifies at start and completion.

mod collector;
mod metrics;

pub use collector::PipelineMetrics;
pub use metrics::{MetricType, MetricsRegistry};

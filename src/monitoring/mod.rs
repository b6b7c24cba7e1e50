//! Monitoring for shard reads
//!
//! Shard clients publish [`ReaderEvent`]s through an [`EventSink`]; the
//! [`MetricsAggregator`] folds them into per-shard counters.

mod metrics;
mod types;

pub use metrics::{MetricsAggregator, ShardMetrics};
pub use types::{EventSink, MonitoringConfig, ReaderEvent, ReaderEventType};

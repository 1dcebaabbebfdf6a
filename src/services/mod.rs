pub mod metrics;

pub use metrics::{MetricsSink, NoopMetrics, RequestSnapshot, StoreMetrics};

pub mod metrics;

pub use metrics::{JobTypeMetrics, LiveMetrics, MetricsSink, MetricsSnapshot};

pub mod metrics;
pub mod monitor;

pub use metrics::{MetricsSnapshot, StreamMetrics};
pub use monitor::AcquisitionMonitor;

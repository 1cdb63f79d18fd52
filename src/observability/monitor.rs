use super::StreamMetrics;
use std::sync::Arc;

/// Collects stream metrics of a session and renders them as text
#[derive(Clone, Default)]
pub struct AcquisitionMonitor {
    streams: Vec<Arc<StreamMetrics>>,
}

impl AcquisitionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, metrics: Arc<StreamMetrics>) {
        self.streams.push(metrics);
    }

    pub fn get(&self, stream: &str) -> Option<Arc<StreamMetrics>> {
        self.streams.iter().find(|m| m.stream() == stream).cloned()
    }

    pub fn generate_report(&self) -> String {
        if self.streams.is_empty() {
            return "No streams registered".to_string();
        }

        let mut report = String::from("=== Acquisition Metrics ===\n");
        for metrics in &self.streams {
            let s = metrics.snapshot();
            report.push_str(&format!(
                "\n[{}]\n  Frames: {}\n  Errors: {}\n  Dropped: {}\n  Avg Loop Latency: {}μs\n",
                s.stream,
                s.frames,
                if s.errors == 1 {
                    "1 error".to_string()
                } else {
                    format!("{} errors", s.errors)
                },
                s.dropped,
                s.avg_latency_us
            ));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_lists_streams() {
        let capture = Arc::new(StreamMetrics::new("capture"));
        capture.record_frame();
        capture.record_error();
        let mut monitor = AcquisitionMonitor::new();
        assert_eq!(monitor.generate_report(), "No streams registered");

        monitor.register(capture);
        monitor.register(Arc::new(StreamMetrics::new("playback")));
        let report = monitor.generate_report();
        assert!(report.contains("[capture]"));
        assert!(report.contains("1 error"));
        assert!(report.contains("[playback]"));
        assert!(monitor.get("playback").is_some());
    }
}

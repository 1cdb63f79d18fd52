use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Lock-free counters of one acquisition stream (capture, playback, ingest)
pub struct StreamMetrics {
    stream: String,
    frames: AtomicU64,
    errors: AtomicU64,
    dropped: AtomicU64,
    total_latency_us: AtomicU64,
    latency_samples: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub stream: String,
    pub frames: u64,
    pub errors: u64,
    pub dropped: u64,
    pub avg_latency_us: u64,
}

impl StreamMetrics {
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            frames: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            latency_samples: AtomicU64::new(0),
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn record_frame(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn start_iteration(&self) -> Instant {
        Instant::now()
    }

    pub fn finish_iteration(&self, start: Instant) {
        let latency_us = start.elapsed().as_micros() as u64;
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency_us(&self) -> u64 {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0;
        }
        self.total_latency_us.load(Ordering::Relaxed) / samples
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            stream: self.stream.clone(),
            frames: self.frames(),
            errors: self.errors(),
            dropped: self.dropped(),
            avg_latency_us: self.avg_latency_us(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = StreamMetrics::new("capture");
        metrics.record_frame();
        metrics.record_frame();
        metrics.record_error();
        metrics.record_dropped(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.stream, "capture");
        assert_eq!(snapshot.frames, 2);
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.dropped, 3);
        assert_eq!(snapshot.avg_latency_us, 0);
    }
}

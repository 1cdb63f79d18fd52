use std::time::{Duration, Instant};

/// Monotonic microsecond clock shared by every stream of a session.
///
/// Cloning keeps the same epoch, so timestamps taken on different threads
/// are directly comparable.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    epoch: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    pub fn now_us(&self) -> i64 {
        self.to_us(Instant::now())
    }

    pub fn to_us(&self, instant: Instant) -> i64 {
        instant.saturating_duration_since(self.epoch).as_micros() as i64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleep until `deadline`; returns immediately when it already passed
pub fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        std::thread::sleep(deadline - now);
    }
}

/// Deadline of the `index`-th tick of a fixed-rate schedule
pub fn tick_deadline(start: Instant, period: Duration, index: u64) -> Instant {
    start + Duration::from_nanos((period.as_nanos() as u64).saturating_mul(index))
}

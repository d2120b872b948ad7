//! Wall-clock gate timers and rolling execution statistics.

use std::time::Instant;

/// Elapsed-time gate for rate-limited operations (carving, feature
/// recomputation).
///
/// Starts running at construction; `has_elapsed` answers whether the
/// configured interval has passed since the last reset.
#[derive(Debug, Clone)]
pub struct GateTimer {
    last_reset: Instant,
}

impl GateTimer {
    pub fn new() -> Self {
        Self {
            last_reset: Instant::now(),
        }
    }

    /// Seconds since the last reset.
    pub fn elapsed_sec(&self) -> f64 {
        self.last_reset.elapsed().as_secs_f64()
    }

    /// Whether at least `interval_sec` seconds have passed since the last
    /// reset. A non-positive interval always gates open.
    pub fn has_elapsed(&self, interval_sec: f64) -> bool {
        interval_sec <= 0.0 || self.elapsed_sec() >= interval_sec
    }

    pub fn reset(&mut self) {
        self.last_reset = Instant::now();
    }
}

impl Default for GateTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Rolling average of execution-time measurements over a wall-clock window.
#[derive(Debug, Clone)]
pub struct TimingStats {
    window_start: Instant,
    total_msec: f64,
    num_measurements: u64,
}

impl TimingStats {
    pub fn new() -> Self {
        Self {
            window_start: Instant::now(),
            total_msec: 0.0,
            num_measurements: 0,
        }
    }

    /// Record one measurement in milliseconds.
    pub fn add_measurement_msec(&mut self, msec: f64) {
        self.total_msec += msec;
        self.num_measurements += 1;
    }

    /// Average measurement in milliseconds, 0 with no measurements.
    pub fn avg_measurement_msec(&self) -> f64 {
        if self.num_measurements == 0 {
            return 0.0;
        }
        self.total_msec / self.num_measurements as f64
    }

    /// Seconds of wall clock accumulated in the current window.
    pub fn elapsed_sec(&self) -> f64 {
        self.window_start.elapsed().as_secs_f64()
    }

    /// Open a fresh window and drop accumulated measurements.
    pub fn reset(&mut self) {
        self.window_start = Instant::now();
        self.total_msec = 0.0;
        self.num_measurements = 0;
    }
}

impl Default for TimingStats {
    fn default() -> Self {
        Self::new()
    }
}

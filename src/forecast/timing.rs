//! Latency histogram for walk-forward steps (fit + predict).

use std::time::Duration;

use hdrhistogram::Histogram;

/// Values stored in microseconds.
pub struct StepTimings {
    inner: Histogram<u64>,
}

impl StepTimings {
    /// Tracks 1us to 1h, 3 significant figures.
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(1, 3_600_000_000, 3)
            .expect("valid histogram bounds");
        Self { inner: histogram }
    }

    pub fn record(&mut self, d: Duration) {
        let us = d.as_micros().clamp(1, 3_600_000_000) as u64;
        let _ = self.inner.record(us);
    }

    /// Return (p50_us, p95_us, p99_us). None if no samples.
    pub fn percentiles(&self) -> Option<(u64, u64, u64)> {
        if self.inner.len() == 0 {
            return None;
        }
        Some((
            self.inner.value_at_quantile(0.5),
            self.inner.value_at_quantile(0.95),
            self.inner.value_at_quantile(0.99),
        ))
    }

    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }
}

impl Default for StepTimings {
    fn default() -> Self {
        Self::new()
    }
}

//! Events-per-second sampling.

use std::time::{Duration, Instant};

/// Recomputes the event rate once per window of wall-clock time.
///
/// The rate is `events since last sample / elapsed seconds`; between samples
/// the last value is reported unchanged.
#[derive(Debug, Clone)]
pub struct EpsSampler {
    window: Duration,
    last_at: Instant,
    last_count: u64,
    eps: f64,
}

impl EpsSampler {
    /// Creates a sampler whose first window starts at `now`.
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            last_at: now,
            last_count: 0,
            eps: 0.0,
        }
    }

    /// Feeds the running event total and returns the current rate.
    pub fn sample(&mut self, now: Instant, total: u64) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_at);
        if elapsed >= self.window && !elapsed.is_zero() {
            let events = total.saturating_sub(self.last_count);
            let rate = events as f64 / elapsed.as_secs_f64();
            self.eps = rate;
            self.last_at = now;
            self.last_count = total;
        }
        self.eps
    }

    /// Last computed rate.
    pub fn eps(&self) -> f64 {
        self.eps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_over_window() {
        let start = Instant::now();
        let mut sampler = EpsSampler::new(Duration::from_millis(500), start);

        assert_eq!(sampler.sample(start + Duration::from_millis(100), 40), 0.0);

        let eps = sampler.sample(start + Duration::from_millis(500), 100);
        assert!((eps - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_holds_value_between_samples() {
        let start = Instant::now();
        let mut sampler = EpsSampler::new(Duration::from_millis(500), start);
        sampler.sample(start + Duration::from_secs(1), 50);

        let held = sampler.sample(start + Duration::from_millis(1200), 5000);
        assert!((held - 50.0).abs() < 1e-9);
        assert!((sampler.eps() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_idle_window_drops_to_zero() {
        let start = Instant::now();
        let mut sampler = EpsSampler::new(Duration::from_millis(500), start);
        sampler.sample(start + Duration::from_secs(1), 10);

        let eps = sampler.sample(start + Duration::from_secs(2), 10);
        assert_eq!(eps, 0.0);
    }
}

//! Clock and timing utilities for frame timestamping.
//!
//! Every frame is stamped once, on the processing thread, with seconds
//! elapsed since a monotonic epoch taken when the pipeline starts. Using
//! a monotonic source keeps the history timestamps non-decreasing.

use std::time::{Duration, Instant};

/// Monotonic clock anchored at pipeline start.
#[derive(Debug, Clone)]
pub struct FrameClock {
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339), for log correlation only.
    epoch_wall: String,
}

impl FrameClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Seconds elapsed since the epoch.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at the epoch.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// The underlying epoch instant.
    pub fn epoch(&self) -> Instant {
        self.epoch
    }
}

/// Gate for periodic work such as FPS log lines.
#[derive(Debug)]
pub struct RateController {
    interval_secs: f64,
    last_tick_secs: Option<f64>,
}

impl RateController {
    /// Fire at most once per `interval`.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval_secs: interval.as_secs_f64(),
            last_tick_secs: None,
        }
    }

    /// Returns true and records the tick if the interval has passed.
    /// The first call always returns true.
    pub fn should_tick(&mut self, now_secs: f64) -> bool {
        match self.last_tick_secs {
            None => {
                self.last_tick_secs = Some(now_secs);
                true
            }
            Some(last) if now_secs >= last + self.interval_secs => {
                self.last_tick_secs = Some(now_secs);
                true
            }
            _ => false,
        }
    }

    pub fn interval_secs(&self) -> f64 {
        self.interval_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotonic() {
        let clock = FrameClock::start();
        let a = clock.elapsed_secs();
        let b = clock.elapsed_secs();
        assert!(b >= a);
        assert!(a < 1.0);
        assert!(!clock.epoch_wall().is_empty());
    }

    #[test]
    fn test_rate_controller() {
        let mut ctrl = RateController::every(Duration::from_secs(2));
        assert!(ctrl.should_tick(0.0)); // first tick always fires
        assert!(!ctrl.should_tick(1.0));
        assert!(ctrl.should_tick(2.0));
        assert!(!ctrl.should_tick(3.5));
        assert!(ctrl.should_tick(4.1));
    }
}

//! Clock and timing utilities.
//!
//! Recordings are anchored to a monotonic epoch taken when the encoder
//! starts; presentation timestamps are derived from it. Wall-clock helpers
//! produce the export file stamps and the on-frame timestamp badge.

use std::time::{Duration, Instant};

/// A recording clock that provides monotonic timestamps relative to
/// a fixed epoch (the moment recording started).
#[derive(Debug, Clone)]
pub struct RecordingClock {
    epoch: Instant,
}

impl RecordingClock {
    /// Create a new recording clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Get nanoseconds elapsed since recording start.
    pub fn elapsed_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Get seconds elapsed since recording start.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// Tick period for a target rate. The render loop and the recording
/// sampler both feed it to `tokio::time::interval`.
#[derive(Debug, Clone, Copy)]
pub struct RateController {
    target_interval_ns: u64,
}

impl RateController {
    /// Create a controller targeting the given Hz rate.
    pub fn new(target_hz: u32) -> Self {
        Self {
            target_interval_ns: 1_000_000_000 / target_hz.max(1) as u64,
        }
    }

    /// Target interval in nanoseconds.
    pub fn interval_ns(&self) -> u64 {
        self.target_interval_ns
    }

    /// Target interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.target_interval_ns)
    }
}

/// Milliseconds since the Unix epoch, used to stamp exported files.
pub fn unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Local wall-clock time formatted for the on-frame badge.
pub fn badge_timestamp() -> String {
    format_badge_timestamp(&chrono::Local::now())
}

/// Format a timestamp the way the badge shows it (`2024-05-01 13:37:00`).
pub fn format_badge_timestamp<Tz>(time: &chrono::DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_clock_elapsed() {
        let clock = RecordingClock::start();
        assert!(clock.elapsed_ns() < 1_000_000_000);
        assert!(clock.elapsed_secs() < 1.0);
    }

    #[test]
    fn test_rate_controller() {
        let ctrl = RateController::new(30);
        assert_eq!(ctrl.interval_ns(), 33_333_333);
        assert_eq!(ctrl.interval(), Duration::from_nanos(33_333_333));
    }

    #[test]
    fn test_rate_controller_zero_hz_does_not_divide_by_zero() {
        let ctrl = RateController::new(0);
        assert_eq!(ctrl.interval_ns(), 1_000_000_000);
    }

    #[test]
    fn test_badge_format() {
        let time = chrono::Utc.with_ymd_and_hms(2024, 5, 1, 13, 37, 0).unwrap();
        assert_eq!(format_badge_timestamp(&time), "2024-05-01 13:37:00");
    }
}

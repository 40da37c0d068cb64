//! Session time base.
//!
//! Intervals are always measured on the monotonic [`Timer`]. The wall clock is
//! read exactly once, when the session starts; every epoch timestamp after that
//! is derived by adding a monotonic offset to that single reading.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::timer::{Timer, ns_to_ms};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionClock {
    origin_ns: u64,
    started_at: DateTime<Utc>,
}

impl SessionClock {
    pub fn start<T: Timer<Timestamp = u64>>(timer: &T) -> Self {
        Self::with_wall_clock(timer.now(), Utc::now())
    }

    pub fn with_wall_clock(origin_ns: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            origin_ns,
            started_at,
        }
    }

    pub fn origin_ns(&self) -> u64 {
        self.origin_ns
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn started_at_iso(&self) -> String {
        self.started_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn start_epoch_ms(&self) -> f64 {
        self.started_at.timestamp_millis() as f64
    }

    /// Milliseconds since session start for a monotonic timestamp.
    pub fn relative_ms(&self, ts_ns: u64) -> f64 {
        ns_to_ms(ts_ns.saturating_sub(self.origin_ns))
    }

    /// Wall-clock milliseconds for an offset from session start.
    pub fn epoch_ms(&self, relative_ms: f64) -> f64 {
        self.start_epoch_ms() + relative_ms
    }
}

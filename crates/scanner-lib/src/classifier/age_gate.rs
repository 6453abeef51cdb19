//! Minimum-age gate
//!
//! A resource younger than its lookback window plus one day has not yet been
//! observed for a full period, so "no activity" would be a false positive.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeGate {
    pub lookback: Duration,
    pub grace: Duration,
}

impl AgeGate {
    pub fn new(lookback_days: u32) -> Self {
        Self {
            lookback: Duration::days(i64::from(lookback_days)),
            grace: Duration::days(1),
        }
    }

    /// Age a resource must reach before it can be classified
    pub fn min_age(&self) -> Duration {
        self.lookback + self.grace
    }

    /// Whether a resource created at `created` is old enough at `now`
    pub fn admits(&self, created: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - created >= self.min_age()
    }

    /// Metric window covering the lookback period ending at `now`
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - self.lookback, now)
    }
}

//! Traffic-shape classification for streaming resources

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrafficPattern {
    Idle,
    Spiky,
    Consistent,
}

impl TrafficPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficPattern::Idle => "IDLE",
            TrafficPattern::Spiky => "SPIKY",
            TrafficPattern::Consistent => "CONSISTENT",
        }
    }
}

impl fmt::Display for TrafficPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Floors and ratio used to classify throughput (MB/s)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficPolicy {
    /// Peak below this (and average below its floor) is idle
    pub idle_peak_floor: f64,
    pub idle_average_floor: f64,
    /// Peak-to-average ratio at or above which traffic is spiky
    pub spike_ratio: f64,
}

impl Default for TrafficPolicy {
    fn default() -> Self {
        Self {
            idle_peak_floor: 0.01,
            idle_average_floor: 0.005,
            spike_ratio: 5.0,
        }
    }
}

impl TrafficPolicy {
    pub fn classify(&self, average: f64, peak: f64) -> TrafficPattern {
        if peak < self.idle_peak_floor && average < self.idle_average_floor {
            return TrafficPattern::Idle;
        }

        if average > 0.0 && peak / average >= self.spike_ratio {
            return TrafficPattern::Spiky;
        }

        TrafficPattern::Consistent
    }
}

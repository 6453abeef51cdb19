//! Byte unit conversions
//!
//! A run uses exactly one divisor for every byte conversion it performs.
//! `Binary` (1024-based) is the default; `Decimal` (1000-based) is available
//! for reports that must line up with billing statements. Report headers use
//! the plain `MB`/`GB` labels for both.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteUnits {
    #[default]
    Binary,
    Decimal,
}

impl ByteUnits {
    fn base(&self) -> f64 {
        match self {
            ByteUnits::Binary => 1024.0,
            ByteUnits::Decimal => 1000.0,
        }
    }

    /// Bytes in one megabyte
    pub fn mega(&self) -> f64 {
        self.base().powi(2)
    }

    /// Bytes in one gigabyte
    pub fn giga(&self) -> f64 {
        self.base().powi(3)
    }

    pub fn to_mb(&self, bytes: f64) -> f64 {
        bytes / self.mega()
    }

    pub fn to_gb(&self, bytes: f64) -> f64 {
        bytes / self.giga()
    }

    /// Average throughput in MB/s for a byte total accumulated over `period_secs`
    pub fn mb_per_sec(&self, bytes: f64, period_secs: u32) -> f64 {
        if period_secs == 0 {
            return 0.0;
        }
        self.to_mb(bytes) / period_secs as f64
    }
}

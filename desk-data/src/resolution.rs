//! Adaptive bucket resolution for time-series aggregation.
//!
//! Longer requested spans use coarser buckets so the number of output points, and therefore the
//! size of the in-memory bucket map, stays roughly constant regardless of how densely a source
//! emits ticks:
//!
//! | span            | bucket width |
//! |-----------------|--------------|
//! | `<= 24h`        | 1 minute     |
//! | `<= 72h`        | 5 minutes    |
//! | `<= 168h`       | 15 minutes   |
//! | `> 168h`        | 60 minutes   |

use chrono::{DateTime, TimeDelta, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

const MILLIS_PER_MINUTE: i64 = 60_000;

/// Tiered `(max span hours inclusive, resolution)` table, in ascending order.
pub const RESOLUTION_TIERS: [(f64, Resolution); 3] = [
    (24.0, Resolution::ONE_MINUTE),
    (72.0, Resolution::FIVE_MINUTES),
    (168.0, Resolution::FIFTEEN_MINUTES),
];

/// Resolution used for any span beyond the last [`RESOLUTION_TIERS`] entry.
pub const COARSEST_RESOLUTION: Resolution = Resolution::ONE_HOUR;

/// Bucket width, in whole minutes.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize,
)]
#[display("{_0}m")]
#[serde(transparent)]
pub struct Resolution(u32);

impl Resolution {
    pub const ONE_MINUTE: Self = Self(1);
    pub const FIVE_MINUTES: Self = Self(5);
    pub const FIFTEEN_MINUTES: Self = Self(15);
    pub const ONE_HOUR: Self = Self(60);

    /// Construct a [`Resolution`] of `minutes` width, clamped to at least one minute.
    pub const fn from_minutes(minutes: u32) -> Self {
        if minutes == 0 { Self(1) } else { Self(minutes) }
    }

    /// Select the bucket width for a requested span of `hours`.
    ///
    /// Zero, negative and NaN spans map to the finest tier.
    pub fn for_span_hours(hours: f64) -> Self {
        if hours.is_nan() || hours <= 0.0 {
            return RESOLUTION_TIERS[0].1;
        }

        RESOLUTION_TIERS
            .iter()
            .find(|(max_hours, _)| hours <= *max_hours)
            .map(|(_, resolution)| *resolution)
            .unwrap_or(COARSEST_RESOLUTION)
    }

    pub fn minutes(&self) -> u32 {
        self.0
    }

    pub fn width(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.0))
    }

    fn width_millis(&self) -> i64 {
        i64::from(self.0) * MILLIS_PER_MINUTE
    }

    /// Start of the bucket containing `time`: `floor(time / width) * width`.
    ///
    /// Timestamps on an exact multiple of the width open their own bucket.
    pub fn bucket_start(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let width = self.width_millis();
        let start = time.timestamp_millis().div_euclid(width) * width;
        DateTime::from_timestamp_millis(start).unwrap_or(time)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::ONE_MINUTE
    }
}

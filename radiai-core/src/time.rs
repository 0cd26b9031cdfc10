//! Time and duration conversion utilities.
//!
//! Wall-clock helpers shared by the resolver and the coordinator, plus safe
//! conversions for durations with explicit saturation behavior.

use chrono::{DateTime, Local, Timelike, Utc};
use std::time::Duration;

/// Extension trait for safe Duration conversions.
pub trait DurationExt {
    /// Whole milliseconds, saturating at `u64::MAX`. Used for timeout reporting.
    fn as_millis_u64(&self) -> u64;

    /// Build a duration from fractional seconds, mapping negative, NaN and
    /// overflowing values to zero or `Duration::MAX` instead of panicking.
    fn from_secs_f64_saturating(secs: f64) -> Self;
}

impl DurationExt for Duration {
    fn as_millis_u64(&self) -> u64 {
        u64::try_from(self.as_millis()).unwrap_or(u64::MAX)
    }

    fn from_secs_f64_saturating(secs: f64) -> Self {
        if secs.is_nan() || secs <= 0.0 {
            return Self::ZERO;
        }
        Self::try_from_secs_f64(secs).unwrap_or(Self::MAX)
    }
}

/// Whole seconds elapsed since local midnight.
///
/// Fractions are dropped so every request within the same second resolves to
/// the same position.
#[must_use]
pub fn seconds_since_midnight(now: &DateTime<Local>) -> f64 {
    f64::from(now.time().num_seconds_from_midnight())
}

/// Seconds between when a position was computed and `now`.
///
/// Negative when the computing clock runs ahead of the local one.
#[must_use]
pub fn clock_skew_secs(computed_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    // Millisecond precision is all the seek target needs
    #[allow(clippy::cast_precision_loss)]
    let millis = (now - computed_at).num_milliseconds() as f64;
    millis / 1000.0
}

// SPDX-License-Identifier: MPL-2.0
//! Time unit conversion utilities for video playback.
//!
//! Presentation timestamps travel through the player as `f64` seconds, while
//! sleeping and the monotonic clock use [`Duration`]. These helpers convert
//! between the two without panicking on negative or non-finite input.

use std::time::Duration;

/// Milliseconds per second as f64 for calculations.
pub const MILLIS_PER_SECOND: f64 = 1_000.0;

/// Converts seconds to a [`Duration`], saturating negative, NaN and
/// infinite values to zero.
///
/// # Examples
///
/// ```
/// use lens_player::video_player::time_units::secs_to_duration;
/// use std::time::Duration;
///
/// assert_eq!(secs_to_duration(0.5), Duration::from_millis(500));
/// assert_eq!(secs_to_duration(-1.0), Duration::ZERO);
/// ```
#[inline]
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// Converts a [`Duration`] to seconds (f64).
#[inline]
pub fn duration_to_secs(duration: Duration) -> f64 {
    duration.as_secs_f64()
}

/// Converts seconds to milliseconds (f64), for log output.
///
/// ```
/// use lens_player::video_player::time_units::secs_to_millis;
///
/// assert_eq!(secs_to_millis(0.25), 250.0);
/// ```
#[inline]
pub fn secs_to_millis(secs: f64) -> f64 {
    secs * MILLIS_PER_SECOND
}

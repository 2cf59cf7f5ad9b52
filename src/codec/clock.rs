// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Timestamps stamped into every event envelope.
//!
//! Each envelope carries three views of the moment it was encoded:
//!
//! - a human-readable local time string with millisecond precision and the
//!   local UTC offset, e.g. `"2026-02-03T15:34:04.123Z +08:00"`
//! - wall-clock nanoseconds since the Unix epoch
//! - monotonic nanoseconds, only meaningful within one process lifetime
//!
//! # Examples
//!
//! ```
//! use chrono::{FixedOffset, TimeZone};
//! use event_notify::codec::{EventTimestamp, format_utc_string};
//!
//! let offset = FixedOffset::east_opt(8 * 3600).unwrap();
//! let dt = offset.with_ymd_and_hms(2026, 2, 3, 15, 34, 4).unwrap();
//! assert_eq!(format_utc_string(&dt), "2026-02-03T15:34:04.000Z +08:00");
//!
//! let now = EventTimestamp::now();
//! assert!(now.local_ns() > 0);
//! ```

use std::sync::OnceLock;
use std::time::Instant;

use chrono::{DateTime, FixedOffset, Local};

/// Format of the envelope's time string.
///
/// The literal `Z` followed by the numeric offset is the established wire
/// convention; consumers parse the offset after the space.
const UTC_STRING_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ %:z";

/// Process-wide origin for monotonic timestamps.
static MONOTONIC_ORIGIN: OnceLock<Instant> = OnceLock::new();

/// The set of timestamps written into one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTimestamp {
    utc_string: String,
    local_ns: u64,
    mono_ns: u64,
}

impl EventTimestamp {
    /// Captures the current wall-clock and monotonic time.
    #[must_use]
    pub fn now() -> Self {
        Self::from_parts(&Local::now().fixed_offset(), monotonic_ns())
    }

    /// Builds a timestamp from an explicit local time and monotonic reading.
    ///
    /// Times before the Unix epoch or beyond the nanosecond range of an
    /// `i64` are stored as a wall-clock value of 0.
    #[must_use]
    pub fn from_parts(local: &DateTime<FixedOffset>, mono_ns: u64) -> Self {
        let local_ns = local
            .timestamp_nanos_opt()
            .and_then(|ns| u64::try_from(ns).ok())
            .unwrap_or_default();

        Self {
            utc_string: format_utc_string(local),
            local_ns,
            mono_ns,
        }
    }

    /// Returns the formatted local time string.
    #[must_use]
    pub fn utc_string(&self) -> &str {
        &self.utc_string
    }

    /// Returns wall-clock nanoseconds since the Unix epoch.
    #[must_use]
    pub fn local_ns(&self) -> u64 {
        self.local_ns
    }

    /// Returns monotonic nanoseconds since the first timestamp of this process.
    #[must_use]
    pub fn mono_ns(&self) -> u64 {
        self.mono_ns
    }
}

/// Formats a local time the way envelopes carry it.
#[must_use]
pub fn format_utc_string(local: &DateTime<FixedOffset>) -> String {
    local.format(UTC_STRING_FORMAT).to_string()
}

/// Reads the monotonic clock in nanoseconds.
///
/// The origin is fixed on first use, so values are comparable only within
/// the current process.
#[must_use]
pub fn monotonic_ns() -> u64 {
    let origin = MONOTONIC_ORIGIN.get_or_init(Instant::now);
    u64::try_from(origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed(hours: i32) -> FixedOffset {
        FixedOffset::east_opt(hours * 3600).unwrap()
    }

    #[test]
    fn format_includes_millis_and_offset() {
        let dt = fixed(8)
            .with_ymd_and_hms(2026, 2, 3, 15, 34, 4)
            .unwrap()
            .checked_add_signed(chrono::TimeDelta::milliseconds(123))
            .unwrap();
        assert_eq!(format_utc_string(&dt), "2026-02-03T15:34:04.123Z +08:00");
    }

    #[test]
    fn format_negative_offset() {
        let dt = fixed(-5).with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(format_utc_string(&dt), "2024-01-15T10:30:00.000Z -05:00");
    }

    #[test]
    fn from_parts_computes_epoch_nanos() {
        let dt = fixed(0).with_ymd_and_hms(1970, 1, 1, 0, 0, 1).unwrap();
        let ts = EventTimestamp::from_parts(&dt, 42);
        assert_eq!(ts.local_ns(), 1_000_000_000);
        assert_eq!(ts.mono_ns(), 42);
    }

    #[test]
    fn pre_epoch_time_clamps_to_zero() {
        let dt = fixed(0).with_ymd_and_hms(1960, 1, 1, 0, 0, 0).unwrap();
        let ts = EventTimestamp::from_parts(&dt, 0);
        assert_eq!(ts.local_ns(), 0);
    }

    #[test]
    fn monotonic_never_goes_backwards() {
        let a = monotonic_ns();
        let b = monotonic_ns();
        assert!(b >= a);
    }

    #[test]
    fn now_has_wall_clock() {
        let ts = EventTimestamp::now();
        assert!(ts.local_ns() > 0);
        assert!(ts.utc_string().contains('T'));
    }
}

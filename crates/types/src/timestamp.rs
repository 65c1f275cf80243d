// This file is part of Aakit.
//
// Aakit is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Aakit is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Aakit.
// If not, see https://www.gnu.org/licenses/.

//! Timestamps and sponsor validity windows.

use std::{
    fmt,
    fmt::{Debug, Display, Formatter},
    ops::Add,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use alloy_primitives::U64;
use chrono::{DateTime, LocalResult, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Seconds since the epoch, as read from the block environment or carried in
/// the `validAfter`/`validUntil` words of a sponsor authorization.
///
/// Serializes and deserializes as a hex quantity.
// Doesn't derive Debug because it has a custom implementation.
#[derive(Clone, Copy, Default, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Minimum timestamp value
    pub const MIN: Timestamp = Timestamp(u64::MIN);
    /// Maximum timestamp value
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    /// Create a new timestamp from seconds since the epoch.
    pub const fn new(seconds_since_epoch: u64) -> Self {
        Self(seconds_since_epoch)
    }

    /// Create a new timestamp representing the current wall clock time.
    ///
    /// Falls back to the epoch if the system clock reads earlier than it.
    pub fn now() -> Self {
        Self(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        )
    }

    /// Returns the number of seconds since the epoch of this timestamp.
    pub fn seconds_since_epoch(self) -> u64 {
        self.0
    }
}

impl From<u64> for Timestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Self;

    fn add(self, duration: Duration) -> Self::Output {
        Self(self.0.saturating_add(duration.as_secs()))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if *self == Self::MAX {
            return f.write_str("never");
        }
        match i64::try_from(self.0).map(|secs| Utc.timestamp_opt(secs, 0)) {
            Ok(LocalResult::Single(datetime)) => Display::fmt(&datetime, f),
            _ => write!(f, "later than {}", DateTime::<Utc>::MAX_UTC),
        }
    }
}

impl Debug for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({} = {})", self.0, self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let n = U64::deserialize(deserializer)?;
        Ok(Self(n.to()))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        U64::from(self.0).serialize(serializer)
    }
}

/// A half-open `[valid_after, valid_until)` window during which a sponsor
/// authorization may be used.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidTimeRange {
    /// The earliest time at which the authorization is valid, inclusive.
    pub valid_after: Timestamp,
    /// The time at which the authorization stops being valid, exclusive.
    pub valid_until: Timestamp,
}

impl Default for ValidTimeRange {
    fn default() -> Self {
        Self::all_time()
    }
}

impl ValidTimeRange {
    /// Create a new time range.
    pub fn new(valid_after: Timestamp, valid_until: Timestamp) -> Self {
        Self {
            valid_after,
            valid_until,
        }
    }

    /// Build a range from the raw words of an authorization. A `valid_until`
    /// of zero means the authorization never expires.
    pub fn from_window(valid_until: u64, valid_after: u64) -> Self {
        let valid_until = if valid_until == 0 {
            Timestamp::MAX
        } else {
            Timestamp::new(valid_until)
        };
        Self::new(Timestamp::new(valid_after), valid_until)
    }

    /// A time range representing that the authorization is valid for all time.
    pub fn all_time() -> Self {
        Self {
            valid_after: Timestamp::MIN,
            valid_until: Timestamp::MAX,
        }
    }

    /// Returns true if `timestamp` lies within `[valid_after, valid_until)`.
    pub fn contains(self, timestamp: Timestamp) -> bool {
        self.valid_after <= timestamp && timestamp < self.valid_until
    }

    /// True if the range has already closed at `timestamp`.
    pub fn is_expired(self, timestamp: Timestamp) -> bool {
        timestamp >= self.valid_until
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wrapping_and_unwrapping_seconds() {
        assert_eq!(Timestamp::new(123).seconds_since_epoch(), 123);
    }

    #[test]
    fn test_adding_duration_saturates() {
        let timestamp = Timestamp::new(100);
        assert_eq!(timestamp + Duration::from_millis(12345), Timestamp::new(112));
        assert_eq!(Timestamp::MAX + Duration::from_secs(1), Timestamp::MAX);
    }

    #[test]
    fn test_display() {
        assert_eq!(Timestamp::new(100).to_string(), "1970-01-01 00:01:40 UTC");
        assert_eq!(Timestamp::MAX.to_string(), "never");
    }

    #[test]
    fn test_debug() {
        let actual = format!("{:?}", Timestamp::new(100));
        assert_eq!(actual, "Timestamp(100 = 1970-01-01 00:01:40 UTC)");
    }

    #[test]
    fn test_serde_hex() {
        let json = serde_json::to_string(&Timestamp::new(100)).unwrap();
        assert_eq!(json, "\"0x64\"");
        let timestamp: Timestamp = serde_json::from_str("\"0x64\"").unwrap();
        assert_eq!(timestamp, Timestamp::new(100));
        serde_json::from_str::<'_, Timestamp>("\"0xg1\"").expect_err("invalid hex");
    }

    #[test]
    fn test_range_is_half_open() {
        let range = ValidTimeRange::new(Timestamp::new(100), Timestamp::new(200));
        assert!(!range.contains(Timestamp::new(99)));
        assert!(range.contains(Timestamp::new(100)));
        assert!(range.contains(Timestamp::new(199)));
        assert!(!range.contains(Timestamp::new(200)));
        assert!(range.is_expired(Timestamp::new(200)));
    }

    #[test]
    fn test_zero_valid_until_never_expires() {
        let range = ValidTimeRange::from_window(0, 0x1234);
        assert_eq!(range.valid_until, Timestamp::MAX);
        assert!(range.contains(Timestamp::new(u64::MAX - 1)));
        assert!(!range.contains(Timestamp::new(0x1233)));
    }
}

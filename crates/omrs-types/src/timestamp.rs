use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Iso8601};

/// A single point in time, used for `createTime`/`updateTime` on instances.
///
/// Opaque wrapper around [`OffsetDateTime`] so that instance timestamps cannot be confused with
/// other time-like values used elsewhere in the crate.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceTimestamp(#[serde(with = "time::serde::iso8601")] OffsetDateTime);

impl InstanceTimestamp {
    pub const UNIX_EPOCH: Self = Self(OffsetDateTime::UNIX_EPOCH);

    #[must_use]
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    #[must_use]
    pub const fn as_offset_date_time(self) -> OffsetDateTime {
        self.0
    }
}

impl fmt::Debug for InstanceTimestamp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, fmt)
    }
}

impl fmt::Display for InstanceTimestamp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, fmt)
    }
}

impl FromStr for InstanceTimestamp {
    type Err = time::error::Parse;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self(OffsetDateTime::parse(value, &Iso8601::PARSING)?))
    }
}

impl From<OffsetDateTime> for InstanceTimestamp {
    fn from(time: OffsetDateTime) -> Self {
        Self(time)
    }
}

/// The version of an instance at its home, strictly increasing per I4.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceVersion(i64);

impl InstanceVersion {
    pub const INITIAL: Self = Self(1);

    #[must_use]
    pub const fn new(version: i64) -> Self {
        Self(version)
    }

    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Returns the next strictly-greater version.
    ///
    /// # Panics
    ///
    /// Panics on overflow: running out of `i64` versions for a single GUID is a logic error in the
    /// caller, not a recoverable condition.
    #[must_use]
    pub fn next(self) -> Self {
        Self(
            self.0
                .checked_add(1)
                .expect("instance version counter overflowed"),
        )
    }
}

impl fmt::Display for InstanceVersion {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, fmt)
    }
}

/// The version of the TypeDef an instance was last stored against (I5).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeVersion(i64);

impl TypeVersion {
    #[must_use]
    pub const fn new(version: i64) -> Self {
        Self(version)
    }

    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TypeVersion {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, fmt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_strictly_increases() {
        let v1 = InstanceVersion::INITIAL;
        let v2 = v1.next();
        assert!(v2 > v1);
    }

    #[test]
    fn timestamp_round_trips_through_json() {
        let now = InstanceTimestamp::now();
        let json = serde_json::to_string(&now).expect("serialize");
        let back: InstanceTimestamp = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(now, back);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message timestamps.
//!
//! All timestamps are UTC RFC 3339 strings with fixed microsecond precision,
//! e.g. `2023-01-14T10:30:00.123456Z`. The fixed width makes the string form
//! order-preserving, which the stores rely on when comparing indexed
//! timestamp values.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// UTC timestamp with microsecond precision.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The current time, truncated to microsecond precision.
    pub fn now() -> Self {
        let micros = Utc::now().timestamp_micros();
        Self(DateTime::from_timestamp_micros(micros).expect("current time is in range"))
    }

    pub fn from_datetime(value: DateTime<Utc>) -> Result<Self, TimestampError> {
        let micros = value.timestamp_micros();
        DateTime::from_timestamp_micros(micros)
            .map(Self)
            .ok_or(TimestampError::OutOfRange)
    }

    /// The RFC 3339 text form.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// A timestamp the given number of seconds later.
    pub fn plus_seconds(&self, seconds: i64) -> Result<Self, TimestampError> {
        let value = self
            .0
            .checked_add_signed(chrono::Duration::seconds(seconds))
            .ok_or(TimestampError::OutOfRange)?;
        Self::from_datetime(value)
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parsed = DateTime::parse_from_rfc3339(value)
            .map_err(|err| TimestampError::Invalid(value.to_string(), err.to_string()))?;
        Self::from_datetime(parsed.with_timezone(&Utc))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Timestamp").field(&self.to_rfc3339()).finish()
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value
            .parse()
            .map_err(|err: TimestampError| serde::de::Error::custom(err.to_string()))
    }
}

/// Error types for the `Timestamp` struct.
#[derive(Debug, Error)]
pub enum TimestampError {
    /// String is not a valid RFC 3339 timestamp.
    #[error("invalid rfc 3339 timestamp \"{0}\": {1}")]
    Invalid(String, String),

    /// Timestamp is outside the representable range.
    #[error("timestamp out of range")]
    OutOfRange,
}

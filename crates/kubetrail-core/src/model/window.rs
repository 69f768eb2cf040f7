//! Time windows for retention and stability queries.

use crate::errors::{invalid_window, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Closed interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// # Errors
    ///
    /// `InvalidWindow` when `end` is not after `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(invalid_window(
                "time_window",
                format!("window end {} is not after start {}", end, start),
            ));
        }
        Ok(Self { start, end })
    }

    /// The `length` immediately preceding `end`.
    ///
    /// # Errors
    ///
    /// `InvalidWindow` when `length` is zero or negative.
    pub fn ending_at(end: DateTime<Utc>, length: Duration) -> Result<Self> {
        ensure_positive("time_window", length)?;
        Self::new(end - length, end)
    }

    /// The `length` immediately preceding now.
    ///
    /// # Errors
    ///
    /// `InvalidWindow` when `length` is zero or negative.
    pub fn last(length: Duration) -> Result<Self> {
        Self::ending_at(Utc::now(), length)
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    pub fn length(&self) -> Duration {
        self.end - self.start
    }
}

/// Reject zero or negative durations.
///
/// # Errors
///
/// `InvalidWindow` for `length <= 0`.
pub fn ensure_positive(op: &str, length: Duration) -> Result<()> {
    if length <= Duration::zero() {
        return Err(invalid_window(
            op,
            format!("window must be positive, got {}s", length.num_seconds()),
        ));
    }
    Ok(())
}

/// Parse a human duration such as `60d`, `12h`, `30m`, `2w` or `45s`.
///
/// # Errors
///
/// `InvalidWindow` for empty input, unknown units, non-numeric amounts,
/// overflow, or a zero amount.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let text = input.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| invalid_window("parse_duration", format!("missing unit in '{}'", input)))?;
    let (amount, unit) = text.split_at(split);
    let amount: i64 = amount
        .parse()
        .map_err(|_| invalid_window("parse_duration", format!("invalid amount in '{}'", input)))?;

    let duration = match unit {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        other => {
            return Err(invalid_window(
                "parse_duration",
                format!("unknown unit '{}' in '{}'", other, input),
            ))
        }
    }
    .ok_or_else(|| invalid_window("parse_duration", format!("'{}' is out of range", input)))?;

    ensure_positive("parse_duration", duration)?;
    Ok(duration)
}

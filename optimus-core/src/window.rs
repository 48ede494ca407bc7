//! Task window math
//!
//! A window turns a scheduled instant into the `[dstart, dend)` range a task
//! reads as its execution context: the instant is truncated down to the start
//! of the configured unit in UTC, the offset is subtracted to give `dend`,
//! and the size is subtracted from `dend` to give `dstart`.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

const DEFAULT_SIZE: &str = "24h";
const DEFAULT_OFFSET: &str = "0h";
const DEFAULT_TRUNCATE_TO: &str = "d";

/// Window rule `(size, offset, truncate_to)` attached to a job task.
///
/// `size` and `offset` are signed durations in hour units (`"24h"`, `"-2h"`);
/// larger units are expressed through `truncate_to ∈ {h, d, w, M}`. Empty
/// fields fall back to `size=24h, offset=0h, truncate_to=d`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub size: String,
    pub offset: String,
    pub truncate_to: String,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            size: DEFAULT_SIZE.to_string(),
            offset: DEFAULT_OFFSET.to_string(),
            truncate_to: DEFAULT_TRUNCATE_TO.to_string(),
        }
    }
}

impl Window {
    pub fn new(
        size: impl Into<String>,
        offset: impl Into<String>,
        truncate_to: impl Into<String>,
    ) -> Self {
        Self {
            size: size.into(),
            offset: offset.into(),
            truncate_to: truncate_to.into(),
        }
    }

    /// Validate all three fields without computing a range
    pub fn validate(&self) -> crate::Result<()> {
        self.size_duration()?;
        self.offset_duration()?;
        self.truncate_unit()?;
        Ok(())
    }

    /// Compute the `[dstart, dend)` range for a scheduled instant.
    ///
    /// Pure: the same `(scheduled_at, size, offset, truncate_to)` always
    /// yields the same range.
    pub fn range(&self, scheduled_at: DateTime<Utc>) -> crate::Result<(DateTime<Utc>, DateTime<Utc>)> {
        let truncated = truncate(scheduled_at, self.truncate_unit()?);
        let dend = truncated - self.offset_duration()?;
        let dstart = dend - self.size_duration()?;
        Ok((dstart, dend))
    }

    fn size_duration(&self) -> crate::Result<Duration> {
        if self.size.is_empty() {
            return parse_hour_duration(DEFAULT_SIZE);
        }
        let size = parse_hour_duration(&self.size)?;
        if size < Duration::zero() {
            return Err(crate::Error::invalid_argument(
                "unable to parse window",
                format!("size cannot be negative, {}", self.size),
            ));
        }
        Ok(size)
    }

    fn offset_duration(&self) -> crate::Result<Duration> {
        if self.offset.is_empty() {
            return Ok(Duration::zero());
        }
        parse_hour_duration(&self.offset)
    }

    fn truncate_unit(&self) -> crate::Result<TruncateUnit> {
        match self.truncate_to.as_str() {
            "" | "d" => Ok(TruncateUnit::Day),
            "h" => Ok(TruncateUnit::Hour),
            "w" => Ok(TruncateUnit::Week),
            "M" => Ok(TruncateUnit::Month),
            other => Err(crate::Error::invalid_argument(
                "unable to parse window",
                format!("invalid truncate option '{}', provide one of: h, d, w, M", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TruncateUnit {
    Hour,
    Day,
    Week,
    Month,
}

/// Snap an instant downward to the start of the unit in UTC. Weeks start
/// Monday 00:00; months on the 1st 00:00.
fn truncate(t: DateTime<Utc>, unit: TruncateUnit) -> DateTime<Utc> {
    let day_start = Utc
        .with_ymd_and_hms(t.year(), t.month(), t.day(), 0, 0, 0)
        .single()
        .expect("midnight always exists in UTC");
    match unit {
        TruncateUnit::Hour => day_start + Duration::hours(t.hour() as i64),
        TruncateUnit::Day => day_start,
        TruncateUnit::Week => {
            let days_from_monday = t.weekday().num_days_from_monday() as i64;
            day_start - Duration::days(days_from_monday)
        }
        TruncateUnit::Month => Utc
            .with_ymd_and_hms(t.year(), t.month(), 1, 0, 0, 0)
            .single()
            .expect("first of month always exists in UTC"),
    }
}

/// Parse a signed hour-unit duration such as `"24h"` or `"-2h"`
fn parse_hour_duration(s: &str) -> crate::Result<Duration> {
    let trimmed = s.trim();
    let hours_str = trimmed.strip_suffix('h').ok_or_else(|| {
        crate::Error::invalid_argument(
            "unable to parse window",
            format!("duration '{}' must be in hour units, e.g. 24h", s),
        )
    })?;
    let hours: i64 = hours_str.parse().map_err(|_| {
        crate::Error::invalid_argument(
            "unable to parse window",
            format!("failed to parse duration '{}'", s),
        )
    })?;
    Ok(Duration::hours(hours))
}

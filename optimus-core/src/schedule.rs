//! Cron schedule parsing and run expansion
//!
//! Job intervals are authored as standard 5-field cron expressions. The cron
//! crate wants a seconds field, so expressions are normalized by prefixing
//! `0 ` before parsing.

use chrono::{DateTime, Duration, Utc};
use std::str::FromStr;

/// A parsed cron schedule for a job
#[derive(Debug, Clone)]
pub struct ScheduleInterval {
    expression: String,
    schedule: cron::Schedule,
}

impl ScheduleInterval {
    /// Parse a cron expression, accepting standard 5-field form as well as
    /// the 6/7-field forms with an explicit seconds (and year) field.
    pub fn parse(expression: &str) -> crate::Result<Self> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(crate::Error::invalid_argument(
                "unable to parse schedule",
                "interval cannot be empty",
            ));
        }

        let normalized = match expression.split_whitespace().count() {
            5 => format!("0 {}", expression),
            _ => expression.to_string(),
        };

        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| {
            crate::Error::invalid_argument(
                "unable to parse schedule",
                format!("invalid cron expression '{}': {}", expression, e),
            )
        })?;

        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    /// The expression as authored
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First scheduled instant strictly after `t`
    pub fn next_after(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&t).next()
    }

    /// Scheduled instants covering the date window `[start, end]`, both ends
    /// inclusive. `end` is a date boundary: runs landing anywhere inside the
    /// end date (before `end + 1d`) are part of the window.
    pub fn runs_between_dates(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        let mut runs = Vec::new();
        if end < start {
            return runs;
        }

        // advance the stop marker past the end date so the last in-window
        // run is included
        let window_close = end + Duration::days(1);
        let mut run_end = match self.next_after(end) {
            Some(t) => t,
            None => return runs,
        };
        while run_end < window_close {
            run_end = match self.next_after(run_end) {
                Some(t) => t,
                None => return runs,
            };
        }

        let mut run = self.next_after(start - Duration::seconds(1));
        while let Some(t) = run {
            if t >= run_end {
                break;
            }
            runs.push(t);
            run = self.next_after(t);
        }
        runs
    }
}

impl PartialEq for ScheduleInterval {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_five_field_expression() {
        let interval = ScheduleInterval::parse("0 2 * * *").unwrap();
        let t = Utc.with_ymd_and_hms(2020, 11, 25, 0, 0, 0).unwrap();
        assert_eq!(
            interval.next_after(t),
            Some(Utc.with_ymd_and_hms(2020, 11, 25, 2, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ScheduleInterval::parse("not a cron").is_err());
        assert!(ScheduleInterval::parse("").is_err());
    }

    #[test]
    fn test_runs_between_dates_daily() {
        let interval = ScheduleInterval::parse("0 2 * * *").unwrap();
        let start = Utc.with_ymd_and_hms(2020, 11, 25, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 11, 28, 0, 0, 0).unwrap();

        let runs = interval.runs_between_dates(start, end);
        assert_eq!(runs.len(), 4);
        assert_eq!(runs[0], Utc.with_ymd_and_hms(2020, 11, 25, 2, 0, 0).unwrap());
        assert_eq!(runs[3], Utc.with_ymd_and_hms(2020, 11, 28, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_runs_between_equal_dates_yields_single_run() {
        let interval = ScheduleInterval::parse("0 2 * * *").unwrap();
        let day = Utc.with_ymd_and_hms(2020, 11, 25, 0, 0, 0).unwrap();

        let runs = interval.runs_between_dates(day, day);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0], Utc.with_ymd_and_hms(2020, 11, 25, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_runs_between_reversed_dates_is_empty() {
        let interval = ScheduleInterval::parse("0 2 * * *").unwrap();
        let start = Utc.with_ymd_and_hms(2020, 11, 28, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 11, 25, 0, 0, 0).unwrap();
        assert!(interval.runs_between_dates(start, end).is_empty());
    }

    #[test]
    fn test_run_start_is_inclusive() {
        // schedule fires exactly at the window start
        let interval = ScheduleInterval::parse("0 0 * * *").unwrap();
        let start = Utc.with_ymd_and_hms(2020, 11, 25, 0, 0, 0).unwrap();
        let runs = interval.runs_between_dates(start, start);
        assert_eq!(runs[0], start);
    }
}

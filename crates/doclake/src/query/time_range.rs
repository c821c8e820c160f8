//! Relative time expressions
//!
//! Expressions are resolved against a caller-supplied "now" in the configured
//! timezone, producing a half-open UTC range `[start, end)`.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::OnceLock;

use crate::config::QueryConfig;
use crate::error::{Error, Result};

/// Longest "last N days" window accepted
pub const MAX_RELATIVE_DAYS: u32 = 3650;

/// A supported relative expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeRange {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    /// N calendar days ending today, inclusive
    LastDays(u32),
}

impl RelativeRange {
    /// Fixed expressions, for prompts and docs
    pub const FIXED: [RelativeRange; 6] = [
        RelativeRange::Today,
        RelativeRange::Yesterday,
        RelativeRange::ThisWeek,
        RelativeRange::LastWeek,
        RelativeRange::ThisMonth,
        RelativeRange::LastMonth,
    ];

    /// Parse an expression such as "last month" or "past 7 days"
    pub fn parse(expr: &str) -> Option<Self> {
        static LAST_DAYS: OnceLock<Option<Regex>> = OnceLock::new();

        let normalized = expr.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        let normalized = normalized.strip_prefix("the ").unwrap_or(&normalized);

        let fixed = match normalized {
            "today" => Some(RelativeRange::Today),
            "yesterday" => Some(RelativeRange::Yesterday),
            "this week" => Some(RelativeRange::ThisWeek),
            "last week" => Some(RelativeRange::LastWeek),
            "this month" => Some(RelativeRange::ThisMonth),
            "last month" => Some(RelativeRange::LastMonth),
            _ => None,
        };
        if fixed.is_some() {
            return fixed;
        }

        let pattern = LAST_DAYS
            .get_or_init(|| Regex::new(r"^(?:last|past) (\d{1,4}) days?$").ok())
            .as_ref()?;
        let days: u32 = pattern.captures(normalized)?.get(1)?.as_str().parse().ok()?;
        if days == 0 || days > MAX_RELATIVE_DAYS {
            return None;
        }
        Some(RelativeRange::LastDays(days))
    }

    pub fn label(&self) -> String {
        match self {
            RelativeRange::Today => "today".to_string(),
            RelativeRange::Yesterday => "yesterday".to_string(),
            RelativeRange::ThisWeek => "this week".to_string(),
            RelativeRange::LastWeek => "last week".to_string(),
            RelativeRange::ThisMonth => "this month".to_string(),
            RelativeRange::LastMonth => "last month".to_string(),
            RelativeRange::LastDays(n) => format!("last {} days", n),
        }
    }
}

/// Half-open UTC interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.start && *ts < self.end
    }
}

/// Resolves relative expressions in a fixed timezone and week convention
#[derive(Debug, Clone, Copy)]
pub struct TimeResolver {
    tz: Tz,
    week_start: Weekday,
}

impl TimeResolver {
    pub fn new(tz: Tz, week_start: Weekday) -> Self {
        Self { tz, week_start }
    }

    pub fn from_config(config: &QueryConfig) -> Result<Self> {
        Ok(Self::new(config.tz()?, config.week_start.weekday()))
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Resolve a textual expression
    pub fn resolve_expr(&self, expr: &str, now: DateTime<Utc>) -> Result<TimeRange> {
        let range = RelativeRange::parse(expr).ok_or_else(|| {
            Error::invalid_parameter("time_range", format!("unsupported expression '{}'", expr))
        })?;
        self.resolve(range, now)
    }

    pub fn resolve(&self, range: RelativeRange, now: DateTime<Utc>) -> Result<TimeRange> {
        let today = now.with_timezone(&self.tz).date_naive();

        let (start, end) = match range {
            RelativeRange::Today => (today, today + Duration::days(1)),
            RelativeRange::Yesterday => (today - Duration::days(1), today),
            RelativeRange::ThisWeek => {
                let start = self.week_start_of(today);
                (start, start + Duration::days(7))
            }
            RelativeRange::LastWeek => {
                let start = self.week_start_of(today);
                (start - Duration::days(7), start)
            }
            RelativeRange::ThisMonth => {
                let start = first_of_month(today)?;
                (start, next_month(start)?)
            }
            RelativeRange::LastMonth => {
                let end = first_of_month(today)?;
                (previous_month(end)?, end)
            }
            RelativeRange::LastDays(n) => {
                (today - Duration::days(i64::from(n) - 1), today + Duration::days(1))
            }
        };

        Ok(TimeRange {
            start: self.local_midnight(start)?,
            end: self.local_midnight(end)?,
        })
    }

    fn week_start_of(&self, date: NaiveDate) -> NaiveDate {
        let offset = (7 + date.weekday().num_days_from_monday()
            - self.week_start.num_days_from_monday())
            % 7;
        date - Duration::days(i64::from(offset))
    }

    /// Start of `date` in the resolver's timezone, as UTC
    fn local_midnight(&self, date: NaiveDate) -> Result<DateTime<Utc>> {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| Error::internal(format!("No midnight for {}", date)))?;

        // Midnight can fall in a DST gap; the first valid instant after it is the start
        let local = self
            .tz
            .from_local_datetime(&midnight)
            .earliest()
            .or_else(|| {
                self.tz
                    .from_local_datetime(&(midnight + Duration::hours(1)))
                    .earliest()
            })
            .ok_or_else(|| Error::internal(format!("No local midnight for {} in {}", date, self.tz)))?;

        Ok(local.with_timezone(&Utc))
    }
}

fn first_of_month(date: NaiveDate) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .ok_or_else(|| Error::internal(format!("Invalid month start for {}", date)))
}

fn next_month(first: NaiveDate) -> Result<NaiveDate> {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| Error::internal(format!("Invalid month after {}", first)))
}

fn previous_month(first: NaiveDate) -> Result<NaiveDate> {
    let (year, month) = if first.month() == 1 {
        (first.year() - 1, 12)
    } else {
        (first.year(), first.month() - 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| Error::internal(format!("Invalid month before {}", first)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn resolver() -> TimeResolver {
        TimeResolver::new(chrono_tz::UTC, Weekday::Mon)
    }

    #[test]
    fn test_parse_expressions() {
        assert_eq!(RelativeRange::parse("Last  Month"), Some(RelativeRange::LastMonth));
        assert_eq!(RelativeRange::parse("the last week"), Some(RelativeRange::LastWeek));
        assert_eq!(RelativeRange::parse("past 7 days"), Some(RelativeRange::LastDays(7)));
        assert_eq!(RelativeRange::parse("last 1 day"), Some(RelativeRange::LastDays(1)));
        assert_eq!(RelativeRange::parse("last 0 days"), None);
        assert_eq!(RelativeRange::parse("next week"), None);
    }

    #[test]
    fn test_today_and_yesterday() {
        // Wednesday
        let now = utc("2026-10-14T15:30:00Z");
        let today = resolver().resolve(RelativeRange::Today, now).unwrap();
        assert_eq!(today.start, utc("2026-10-14T00:00:00Z"));
        assert_eq!(today.end, utc("2026-10-15T00:00:00Z"));
        assert!(today.contains(&now));

        let yesterday = resolver().resolve(RelativeRange::Yesterday, now).unwrap();
        assert_eq!(yesterday.start, utc("2026-10-13T00:00:00Z"));
        assert_eq!(yesterday.end, today.start);
    }

    #[test]
    fn test_weeks_respect_week_start() {
        let now = utc("2026-10-14T15:30:00Z");

        let monday = resolver().resolve(RelativeRange::ThisWeek, now).unwrap();
        assert_eq!(monday.start, utc("2026-10-12T00:00:00Z"));
        assert_eq!(monday.end, utc("2026-10-19T00:00:00Z"));

        let sunday = TimeResolver::new(chrono_tz::UTC, Weekday::Sun)
            .resolve(RelativeRange::LastWeek, now)
            .unwrap();
        assert_eq!(sunday.start, utc("2026-10-04T00:00:00Z"));
        assert_eq!(sunday.end, utc("2026-10-11T00:00:00Z"));
    }

    #[test]
    fn test_months_across_year_boundary() {
        let now = utc("2026-01-10T08:00:00Z");
        let last = resolver().resolve(RelativeRange::LastMonth, now).unwrap();
        assert_eq!(last.start, utc("2025-12-01T00:00:00Z"));
        assert_eq!(last.end, utc("2026-01-01T00:00:00Z"));

        let this = resolver()
            .resolve(RelativeRange::ThisMonth, utc("2025-12-31T23:00:00Z"))
            .unwrap();
        assert_eq!(this.end, utc("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn test_last_n_days_includes_today() {
        let now = utc("2026-10-14T15:30:00Z");
        let range = resolver().resolve(RelativeRange::LastDays(7), now).unwrap();
        assert_eq!(range.start, utc("2026-10-08T00:00:00Z"));
        assert_eq!(range.end, utc("2026-10-15T00:00:00Z"));
    }

    #[test]
    fn test_timezone_shifts_day_boundaries() {
        // 2026-10-14T20:00Z is already the 15th in Tokyo
        let resolver = TimeResolver::new(chrono_tz::Asia::Tokyo, Weekday::Mon);
        let today = resolver
            .resolve(RelativeRange::Today, utc("2026-10-14T20:00:00Z"))
            .unwrap();
        assert_eq!(today.start, utc("2026-10-14T15:00:00Z"));
        assert_eq!(today.end, utc("2026-10-15T15:00:00Z"));
    }

    #[test]
    fn test_unknown_expression_is_invalid_parameter() {
        let err = resolver()
            .resolve_expr("the day after tomorrow", Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }
}

//! Business-time handling for reports
//!
//! Ledger timestamps are stored in UTC. Reports ("today", "this month") are
//! evaluated in the business's local timezone and resolved back to a
//! half-open UTC range.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Timezone wrapper for the business location
///
/// Wraps chrono_tz::Tz with custom serialization support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for Timezone {
    type Err = TemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tz::from_str(s.trim())
            .map(Timezone)
            .map_err(|_| TemporalError::UnknownTimezone(s.to_string()))
    }
}

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Returns the local calendar date of a UTC instant
    pub fn local_date(&self, utc: DateTime<Utc>) -> NaiveDate {
        utc.with_timezone(&self.0).date_naive()
    }

    /// Gets the start of day (00:00) in this timezone as UTC
    ///
    /// On days where midnight does not exist locally, the first instant of
    /// the day after the gap is used.
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(chrono::NaiveTime::MIN);
        match self.0.from_local_datetime(&midnight) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
            LocalResult::None => {
                let shifted = midnight + Duration::hours(1);
                self.0
                    .from_local_datetime(&shifted)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
            }
        }
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(chrono_tz::Asia::Kolkata)
    }
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name())
    }
}

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid period: start {start} must be before end {end}")]
    InvalidPeriod {
        start: String,
        end: String,
    },

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Unknown report period: {0}")]
    UnknownPeriod(String),
}

/// A half-open UTC range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TemporalError> {
        if start >= end {
            return Err(TemporalError::InvalidPeriod {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp < self.end
    }
}

/// Reporting window selected on the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ReportPeriod {
    #[default]
    All,
    Today,
    ThisWeek,
    ThisMonth,
    ThisYear,
    /// Inclusive calendar dates in the business timezone
    Custom { from: NaiveDate, to: NaiveDate },
}

impl ReportPeriod {
    /// Builds a custom period, rejecting `from` after `to`
    pub fn custom(from: NaiveDate, to: NaiveDate) -> Result<Self, TemporalError> {
        if from > to {
            return Err(TemporalError::InvalidPeriod {
                start: from.to_string(),
                end: to.to_string(),
            });
        }
        Ok(ReportPeriod::Custom { from, to })
    }

    /// Resolves the period to a UTC range relative to `now`
    ///
    /// Returns `None` for `All`. Weeks start on Monday.
    pub fn range(&self, now: DateTime<Utc>, tz: Timezone) -> Option<DateRange> {
        let today = tz.local_date(now);
        let (first, last) = match *self {
            ReportPeriod::All => return None,
            ReportPeriod::Today => (today, today),
            ReportPeriod::ThisWeek => {
                let offset = today.weekday().num_days_from_monday() as i64;
                let monday = today - Duration::days(offset);
                (monday, monday + Duration::days(6))
            }
            ReportPeriod::ThisMonth => {
                let first = today.with_day(1).unwrap_or(today);
                (first, last_day_of_month(first))
            }
            ReportPeriod::ThisYear => {
                let first = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
                let last = NaiveDate::from_ymd_opt(today.year(), 12, 31).unwrap_or(today);
                (first, last)
            }
            ReportPeriod::Custom { from, to } => (from, to),
        };

        let start = tz.start_of_day(first);
        let end = tz.start_of_day(last.succ_opt().unwrap_or(last));
        Some(DateRange { start, end })
    }

    /// Human-readable label for report headers
    pub fn label(&self) -> String {
        match self {
            ReportPeriod::All => "All time".to_string(),
            ReportPeriod::Today => "Today".to_string(),
            ReportPeriod::ThisWeek => "This week".to_string(),
            ReportPeriod::ThisMonth => "This month".to_string(),
            ReportPeriod::ThisYear => "This year".to_string(),
            ReportPeriod::Custom { from, to } if from == to => from.format("%d %b %Y").to_string(),
            ReportPeriod::Custom { from, to } => {
                format!("{} - {}", from.format("%d %b %Y"), to.format("%d %b %Y"))
            }
        }
    }
}

impl FromStr for ReportPeriod {
    type Err = TemporalError;

    /// Parses the named windows (`all`, `today`, `week`, `month`, `year`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(ReportPeriod::All),
            "today" => Ok(ReportPeriod::Today),
            "week" | "this_week" => Ok(ReportPeriod::ThisWeek),
            "month" | "this_month" => Ok(ReportPeriod::ThisMonth),
            "year" | "this_year" => Ok(ReportPeriod::ThisYear),
            other => Err(TemporalError::UnknownPeriod(other.to_string())),
        }
    }
}

fn last_day_of_month(first: NaiveDate) -> NaiveDate {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_today_in_kolkata() {
        // 20:00 UTC on the 16th is already the 17th in India
        let range = ReportPeriod::Today
            .range(at(2026, 10, 16, 20), Timezone::default())
            .unwrap();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2026, 10, 16, 18, 30, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2026, 10, 17, 18, 30, 0).unwrap());
    }

    #[test]
    fn test_this_month_handles_december() {
        let tz = Timezone(chrono_tz::UTC);
        let range = ReportPeriod::ThisMonth.range(at(2026, 12, 15, 0), tz).unwrap();
        assert_eq!(range.start, at(2026, 12, 1, 0));
        assert_eq!(range.end, at(2027, 1, 1, 0));
    }

    #[test]
    fn test_all_has_no_range() {
        assert!(ReportPeriod::All.range(Utc::now(), Timezone::default()).is_none());
    }

    #[test]
    fn test_custom_rejects_inverted_dates() {
        let from = NaiveDate::from_ymd_opt(2026, 5, 2).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        assert!(ReportPeriod::custom(from, to).is_err());
    }
}

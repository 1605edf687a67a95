use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ModelError;

/// Cadence on which an accumulative counter rolls over.
///
/// Boundaries are computed in UTC. Weekly periods start Monday 00:00;
/// monthly on the 1st; yearly on Jan 1. `Never` spans a fixed century
/// window rather than looping forever, so callers can still treat it as
/// a bounded `[start, end)` like every other period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResetPeriod {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

const ONE_NANOSECOND: Duration = Duration::nanoseconds(1);

impl ResetPeriod {
    /// Returns `[start, end)` for the period containing `now`, with
    /// `end` modeled as `next_period_start - 1ns` for convenience (the
    /// upper bound is inclusive at nanosecond precision rather than a
    /// literal open interval, since most call sites want a closed range
    /// to hand to a repository query).
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.period_start(now);
        let next = self.next_period_start(start);
        (start, next - ONE_NANOSECOND)
    }

    fn period_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let date = now.date_naive();
        match self {
            ResetPeriod::Daily => midnight(date),
            ResetPeriod::Weekly => {
                // Monday = 1 .. Sunday = 7, so day 1 already sits on
                // Monday; subtract (weekday - 1) days to land there.
                let iso_weekday = date.weekday().number_from_monday();
                midnight(date - Duration::days(i64::from(iso_weekday) - 1))
            }
            ResetPeriod::Monthly => midnight(
                NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
                    .expect("first of month is always valid"),
            ),
            ResetPeriod::Yearly => {
                midnight(NaiveDate::from_ymd_opt(date.year(), 1, 1).expect("Jan 1 is always valid"))
            }
            ResetPeriod::Never => midnight(
                NaiveDate::from_ymd_opt(2000, 1, 1).expect("2000-01-01 is always valid"),
            ),
        }
    }

    fn next_period_start(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        let date = start.date_naive();
        match self {
            ResetPeriod::Daily => start + Duration::days(1),
            ResetPeriod::Weekly => start + Duration::days(7),
            ResetPeriod::Monthly => {
                let (year, month) = if date.month() == 12 {
                    (date.year() + 1, 1)
                } else {
                    (date.year(), date.month() + 1)
                };
                midnight(NaiveDate::from_ymd_opt(year, month, 1).expect("valid month start"))
            }
            ResetPeriod::Yearly => midnight(
                NaiveDate::from_ymd_opt(date.year() + 1, 1, 1).expect("valid year start"),
            ),
            ResetPeriod::Never => midnight(
                NaiveDate::from_ymd_opt(2101, 1, 1).expect("2101-01-01 is always valid"),
            ),
        }
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
}

impl fmt::Display for ResetPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResetPeriod::Daily => "DAILY",
            ResetPeriod::Weekly => "WEEKLY",
            ResetPeriod::Monthly => "MONTHLY",
            ResetPeriod::Yearly => "YEARLY",
            ResetPeriod::Never => "NEVER",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ResetPeriod {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DAILY" => Ok(ResetPeriod::Daily),
            "WEEKLY" => Ok(ResetPeriod::Weekly),
            "MONTHLY" => Ok(ResetPeriod::Monthly),
            "YEARLY" => Ok(ResetPeriod::Yearly),
            "NEVER" => Ok(ResetPeriod::Never),
            other => Err(ModelError::InvalidResetPeriod(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn weekly_period_starts_on_monday() {
        // 2024-07-24 is a Wednesday.
        let wednesday = Utc.with_ymd_and_hms(2024, 7, 24, 15, 30, 0).unwrap();
        let (start, _) = ResetPeriod::Weekly.bounds(wednesday);
        assert_eq!(start.weekday(), chrono::Weekday::Mon);
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2024, 7, 22).unwrap());
    }

    #[test]
    fn monthly_period_rolls_over_december() {
        let dec = Utc.with_ymd_and_hms(2024, 12, 15, 0, 0, 0).unwrap();
        let (start, end) = ResetPeriod::Monthly.bounds(dec);
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
    }

    #[test]
    fn never_spans_the_configured_century() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 0, 0, 0).unwrap();
        let (start, end) = ResetPeriod::Never.bounds(now);
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2100, 12, 31).unwrap());
    }

    proptest! {
        #[test]
        fn start_always_le_now_lt_end_plus_1ns(
            period_kind in 0..4usize,
            year in 2001i32..2099,
            month in 1u32..=12,
            day in 1u32..=28,
            secs in 0i64..86_400,
        ) {
            let periods = [ResetPeriod::Daily, ResetPeriod::Weekly, ResetPeriod::Monthly, ResetPeriod::Yearly];
            let period = periods[period_kind];
            let date = NaiveDate::from_ymd_opt(year, month, day).unwrap();
            let now = date.and_hms_opt(0, 0, 0).unwrap().and_utc() + Duration::seconds(secs);
            let (start, end) = period.bounds(now);
            prop_assert!(start <= now);
            prop_assert!(now < end + ONE_NANOSECOND);
        }
    }
}

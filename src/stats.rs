//! Day-bucketed revenue over a rolling window.
//!
//! The store returns one [`DayBucket`] per calendar day that has at least one invoice; days with
//! nothing in them produce no row. Consumers that want a continuous series run the result
//! through [`fill_gaps`].

use std::collections::BTreeMap;

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Length of the stats window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Week,
    Month,
}

impl Period {
    /// `"week"` selects the 7-day window; anything else, including nothing, selects the month.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("week") => Period::Week,
            _ => Period::Month,
        }
    }

    pub fn days(&self) -> u64 {
        match self {
            Period::Week => 7,
            Period::Month => 30,
        }
    }
}

/// One calendar day's worth of invoices.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct DayBucket {
    pub day: NaiveDate,
    pub count: i64,
    #[serde(serialize_with = "serialize_total")]
    pub total: BigDecimal,
}

fn serialize_total<S>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&value.to_string())
}

/// The inclusive run of calendar days `[first_day, last_day]` that a stats query covers, in the
/// timezone days are cut in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsWindow {
    pub period: Period,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub timezone: Tz,
}

impl StatsWindow {
    /// The window of `period.days()` days ending on (and including) `today`.
    pub fn ending_on(period: Period, today: NaiveDate, timezone: Tz) -> Self {
        let first_day = today
            .checked_sub_days(Days::new(period.days() - 1))
            .unwrap_or(NaiveDate::MIN);
        Self {
            period,
            first_day,
            last_day: today,
            timezone,
        }
    }

    /// The window ending today, as seen from `timezone`.
    pub fn current(period: Period, timezone: Tz) -> Self {
        let today = Utc::now().with_timezone(&timezone).date_naive();
        Self::ending_on(period, today, timezone)
    }

    /// Half-open instant range `[start, end)` covering every day in the window.
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            start_of_day(self.first_day, self.timezone),
            start_of_day(next_day(self.last_day), self.timezone),
        )
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.first_day <= day && day <= self.last_day
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.first_day
            .iter_days()
            .take_while(move |d| d <= &self.last_day)
    }
}

pub(crate) fn next_day(day: NaiveDate) -> NaiveDate {
    day.succ_opt().unwrap_or(NaiveDate::MAX)
}

/// The first instant of `day` in `tz`. On a DST gap at midnight the earliest valid local time
/// is used.
pub fn start_of_day(day: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = day.and_time(chrono::NaiveTime::MIN);
    match tz.from_local_datetime(&midnight).earliest() {
        Some(local) => local.with_timezone(&Utc),
        None => (0..24 * 60)
            .find_map(|m| {
                tz.from_local_datetime(&(midnight + chrono::Duration::minutes(m)))
                    .earliest()
            })
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight)),
    }
}

/// Group `(date, total)` pairs into sparse day buckets in ascending day order. Entries outside
/// `window` are dropped.
pub fn bucket_by_day<'a, I>(window: &StatsWindow, entries: I) -> Vec<DayBucket>
where
    I: IntoIterator<Item = (DateTime<Utc>, &'a BigDecimal)>,
{
    let mut buckets: BTreeMap<NaiveDate, (i64, BigDecimal)> = BTreeMap::new();
    for (date, total) in entries {
        let day = date.with_timezone(&window.timezone).date_naive();
        if !window.contains(day) {
            continue;
        }
        let entry = buckets
            .entry(day)
            .or_insert_with(|| (0, BigDecimal::zero()));
        entry.0 += 1;
        entry.1 += total;
    }
    buckets
        .into_iter()
        .map(|(day, (count, total))| DayBucket { day, count, total })
        .collect()
}

/// Expand a sparse series into one bucket per day of `window`, with zero count and total on days
/// that had no invoices. Buckets outside the window are discarded.
pub fn fill_gaps(window: &StatsWindow, sparse: Vec<DayBucket>) -> Vec<DayBucket> {
    let mut by_day: BTreeMap<NaiveDate, DayBucket> =
        sparse.into_iter().map(|b| (b.day, b)).collect();
    window
        .days()
        .map(|day| {
            by_day.remove(&day).unwrap_or_else(|| DayBucket {
                day,
                count: 0,
                total: BigDecimal::zero(),
            })
        })
        .collect()
}

// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Interval bucketing
//!
//! Maps calendar dates onto canonical interval keys. Keys are the ISO date
//! (`YYYY-MM-DD`) of the first day of the bucket and are always computed on
//! the UTC calendar, so every device and the server agree on them.

use crate::errors::{CompetitionError, CompetitionResult};
use crate::models::{Competition, DailyDistance, DistanceUnit, IntervalBucket};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const KEY_FORMAT: &str = "%Y-%m-%d";

/// Canonical identifier of a scoring interval
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntervalKey(String);

impl IntervalKey {
    /// Key for an interval starting on `start`
    pub fn from_start(start: NaiveDate) -> Self {
        Self(start.format(KEY_FORMAT).to_string())
    }

    /// Parse a key, rejecting anything that is not a zero-padded ISO date
    pub fn parse(raw: &str) -> CompetitionResult<Self> {
        let date = NaiveDate::parse_from_str(raw, KEY_FORMAT)
            .map_err(|e| CompetitionError::DecodeFailure(format!("bad interval key {raw}: {e}")))?;
        let key = Self::from_start(date);
        if key.0 != raw {
            return Err(CompetitionError::DecodeFailure(format!(
                "interval key {raw} is not canonical"
            )));
        }
        Ok(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First day of the interval, `None` for keys that never went through `parse`
    pub fn start_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.0, KEY_FORMAT).ok()
    }
}

impl fmt::Display for IntervalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// First day of the bucket containing `date`
pub fn interval_start(date: NaiveDate, bucket: IntervalBucket, first_weekday: Weekday) -> NaiveDate {
    match bucket {
        IntervalBucket::Day => date,
        IntervalBucket::Week => {
            let offset = (7 + date.weekday().num_days_from_monday()
                - first_weekday.num_days_from_monday())
                % 7;
            date - Duration::days(i64::from(offset))
        }
        IntervalBucket::Month => date.with_day(1).unwrap_or(date),
    }
}

/// Canonical key of the bucket containing `date`
pub fn interval_key(date: NaiveDate, bucket: IntervalBucket, first_weekday: Weekday) -> IntervalKey {
    IntervalKey::from_start(interval_start(date, bucket, first_weekday))
}

/// Canonical key of the bucket containing an instant, read on the UTC calendar
pub fn interval_key_at(instant: DateTime<Utc>, bucket: IntervalBucket, first_weekday: Weekday) -> IntervalKey {
    interval_key(instant.date_naive(), bucket, first_weekday)
}

/// A bucket size paired with its week convention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalCalendar {
    pub bucket: IntervalBucket,
    pub first_weekday: Weekday,
}

impl IntervalCalendar {
    pub fn new(bucket: IntervalBucket, first_weekday: Weekday) -> Self {
        Self {
            bucket,
            first_weekday,
        }
    }

    pub fn for_competition(competition: &Competition, first_weekday: Weekday) -> Self {
        Self::new(competition.options.interval_bucket, first_weekday)
    }

    pub fn start(&self, date: NaiveDate) -> NaiveDate {
        interval_start(date, self.bucket, self.first_weekday)
    }

    pub fn key(&self, date: NaiveDate) -> IntervalKey {
        interval_key(date, self.bucket, self.first_weekday)
    }

    /// Start of the bucket following the one that begins on `start`
    pub fn next_start(&self, start: NaiveDate) -> NaiveDate {
        match self.bucket {
            IntervalBucket::Day => start + Duration::days(1),
            IntervalBucket::Week => start + Duration::days(7),
            IntervalBucket::Month => start
                .checked_add_months(Months::new(1))
                .unwrap_or(NaiveDate::MAX),
        }
    }

    /// Ordered keys of every bucket touching `from..=to`
    pub fn keys_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<IntervalKey> {
        let mut keys = Vec::new();
        if to < from {
            return keys;
        }
        let last = self.start(to);
        let mut cursor = self.start(from);
        while cursor <= last {
            keys.push(IntervalKey::from_start(cursor));
            let next = self.next_start(cursor);
            if next <= cursor {
                break;
            }
            cursor = next;
        }
        keys
    }

    /// Whether a key names the first day of a bucket under this calendar
    pub fn is_canonical(&self, key: &IntervalKey) -> bool {
        key.start_date()
            .is_some_and(|date| self.start(date) == date)
    }

    /// Fold per-day provider distances (meters) into interval records in `unit`
    pub fn aggregate(&self, days: &[DailyDistance], unit: DistanceUnit) -> BTreeMap<IntervalKey, f64> {
        let mut intervals = BTreeMap::new();
        for day in days {
            if !day.distance_meters.is_finite() || day.distance_meters <= 0.0 {
                continue;
            }
            *intervals.entry(self.key(day.date)).or_insert(0.0) += unit.from_meters(day.distance_meters);
        }
        intervals
    }
}

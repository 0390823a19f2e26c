//! Grouping rules that map a value onto a small discrete bucket id.
//!
//! Bucketers never influence storage. The ordering engine compares bucket ids instead of values
//! for fields that carry one, so records fall into coarse groups (months, quarters, numeric
//! ranges) before any finer ordering applies.

use crate::error::{CacheError, CacheResult};
use crate::value::Value;
use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Bucket id for missing and non-numeric values.
pub const BUCKET_NONE: i64 = -1;
/// Bucket id for values below the configured minimum.
pub const BUCKET_BEFORE_RANGE: i64 = 0;

/// Most in-range buckets a series may define; bucket ids stay exact in both `f64` and `i64`.
const MAX_SERIES_BUCKETS: f64 = (1u64 << 53) as f64;

/// Calendar component used by date grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DateUnit {
    Second,
    Minute,
    Hour,
    DayOfYear,
    Month,
    CalendarQuarter,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Bucketer {
    /// Groups date serials (1900 date system) by a calendar component.
    Date {
        unit: DateUnit,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
    },
    /// Groups numbers into `[minimum + k * step, minimum + (k + 1) * step)` ranges.
    Series { minimum: f64, maximum: f64, step: f64 },
}

impl Bucketer {
    pub fn date(unit: DateUnit) -> Self {
        Bucketer::Date {
            unit,
            minimum: None,
            maximum: None,
        }
    }

    pub fn series(minimum: f64, maximum: f64, step: f64) -> Self {
        Bucketer::Series {
            minimum,
            maximum,
            step,
        }
    }

    pub fn validate(&self) -> CacheResult<()> {
        match *self {
            Bucketer::Date {
                minimum, maximum, ..
            } => {
                if minimum.is_some_and(|v| !v.is_finite()) || maximum.is_some_and(|v| !v.is_finite())
                {
                    return Err(CacheError::InvalidBucketer(
                        "date bounds must be finite".to_string(),
                    ));
                }
                if let (Some(min), Some(max)) = (minimum, maximum) {
                    if min > max {
                        return Err(CacheError::InvalidBucketer(format!(
                            "start date {min} is after end date {max}"
                        )));
                    }
                }
                Ok(())
            }
            Bucketer::Series {
                minimum,
                maximum,
                step,
            } => {
                if !(minimum.is_finite() && maximum.is_finite() && step.is_finite()) {
                    return Err(CacheError::InvalidBucketer(
                        "series bounds must be finite".to_string(),
                    ));
                }
                if minimum > maximum {
                    return Err(CacheError::InvalidBucketer(format!(
                        "series minimum {minimum} exceeds maximum {maximum}"
                    )));
                }
                if step <= 0.0 {
                    return Err(CacheError::InvalidBucketer(format!(
                        "series step must be positive, got {step}"
                    )));
                }
                if (maximum - minimum) / step > MAX_SERIES_BUCKETS {
                    return Err(CacheError::InvalidBucketer(format!(
                        "series step {step} yields more than {MAX_SERIES_BUCKETS} buckets"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Map a value onto its bucket id.
    ///
    /// Missing and non-numeric values map to [`BUCKET_NONE`]; values below the range map to
    /// [`BUCKET_BEFORE_RANGE`]; values above it map past every in-range bucket.
    pub fn apply(&self, value: Option<&Value>) -> i64 {
        let Some(v) = value.and_then(Value::as_number) else {
            return BUCKET_NONE;
        };
        if v.is_nan() {
            return BUCKET_NONE;
        }

        match *self {
            Bucketer::Date {
                unit,
                minimum,
                maximum,
            } => {
                if minimum.is_some_and(|min| v < min) {
                    return BUCKET_BEFORE_RANGE;
                }
                if maximum.is_some_and(|max| v > max) {
                    return i64::MAX;
                }
                match SerialDateTime::from_serial(v) {
                    Some(date) => date.component(unit),
                    None => BUCKET_NONE,
                }
            }
            Bucketer::Series {
                minimum,
                maximum,
                step,
            } => {
                let count = self.series_bucket_count();
                if v < minimum {
                    BUCKET_BEFORE_RANGE
                } else if v > maximum {
                    count.saturating_add(1)
                } else {
                    (((v - minimum) / step).floor() as i64)
                        .saturating_add(1)
                        .min(count)
                }
            }
        }
    }

    fn series_bucket_count(&self) -> i64 {
        match *self {
            Bucketer::Series {
                minimum,
                maximum,
                step,
            } => (((maximum - minimum) / step).floor() as i64).saturating_add(1),
            Bucketer::Date { .. } => 0,
        }
    }
}

/// First serial past the supported calendar (`10000-01-01`).
const DATE_SERIAL_END: f64 = 2_958_466.0;

/// Serial of 1900-02-29, a day the 1900 date system counts but the calendar never had.
const PHANTOM_LEAP_DAY: i64 = 60;

const SECONDS_PER_DAY: i64 = 86_400;

/// A 1900-system date serial decoded to a calendar timestamp, rounded to seconds.
///
/// Serials 1 through 59 count from 1899-12-31 and later serials from 1899-12-30, so
/// serial 1 is 1900-01-01 and serial 61 is 1900-03-01. Serial 60 keeps the time of day of
/// 1900-02-28 but reports day of year 60.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SerialDateTime {
    datetime: NaiveDateTime,
    phantom_leap_day: bool,
}

impl SerialDateTime {
    pub(crate) fn from_serial(serial: f64) -> Option<Self> {
        if !(0.0..DATE_SERIAL_END).contains(&serial) {
            return None;
        }
        let seconds = (serial * SECONDS_PER_DAY as f64).round() as i64;
        let day = seconds.div_euclid(SECONDS_PER_DAY);
        let time = TimeDelta::try_seconds(seconds.rem_euclid(SECONDS_PER_DAY))?;

        let (epoch, offset, phantom_leap_day) = match day.cmp(&PHANTOM_LEAP_DAY) {
            Ordering::Less => (NaiveDate::from_ymd_opt(1899, 12, 31)?, day, false),
            Ordering::Equal => (NaiveDate::from_ymd_opt(1900, 2, 28)?, 0, true),
            Ordering::Greater => (NaiveDate::from_ymd_opt(1899, 12, 30)?, day, false),
        };
        let date = epoch.checked_add_signed(TimeDelta::try_days(offset)?)?;
        let datetime = date.and_hms_opt(0, 0, 0)?.checked_add_signed(time)?;
        Some(Self {
            datetime,
            phantom_leap_day,
        })
    }

    fn component(&self, unit: DateUnit) -> i64 {
        let dt = &self.datetime;
        match unit {
            DateUnit::Second => i64::from(dt.second()) + 1,
            DateUnit::Minute => i64::from(dt.minute()) + 1,
            DateUnit::Hour => i64::from(dt.hour()) + 1,
            DateUnit::DayOfYear if self.phantom_leap_day => PHANTOM_LEAP_DAY,
            DateUnit::DayOfYear => i64::from(dt.ordinal()),
            DateUnit::Month => i64::from(dt.month()),
            DateUnit::CalendarQuarter => i64::from((dt.month() - 1) / 3 + 1),
            DateUnit::Year => i64::from(dt.year()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_units_extract_calendar_components() {
        // 2024-05-17 06:30:15
        let serial = 45_429.0 + (6.0 * 3600.0 + 30.0 * 60.0 + 15.0) / 86_400.0;
        let value = Value::number(serial);

        assert_eq!(Bucketer::date(DateUnit::Year).apply(Some(&value)), 2024);
        assert_eq!(Bucketer::date(DateUnit::Month).apply(Some(&value)), 5);
        assert_eq!(Bucketer::date(DateUnit::CalendarQuarter).apply(Some(&value)), 2);
        assert_eq!(Bucketer::date(DateUnit::DayOfYear).apply(Some(&value)), 138);
        assert_eq!(Bucketer::date(DateUnit::Hour).apply(Some(&value)), 7);
        assert_eq!(Bucketer::date(DateUnit::Minute).apply(Some(&value)), 31);
        assert_eq!(Bucketer::date(DateUnit::Second).apply(Some(&value)), 16);
    }

    #[test]
    fn early_1900_serials_follow_the_phantom_leap_day() {
        let apply = |unit, serial: f64| Bucketer::date(unit).apply(Some(&Value::number(serial)));

        // Serial 1 is 1900-01-01.
        assert_eq!(apply(DateUnit::Year, 1.0), 1900);
        assert_eq!(apply(DateUnit::Month, 1.0), 1);
        assert_eq!(apply(DateUnit::DayOfYear, 1.0), 1);

        // Serial 59 is 1900-02-28.
        assert_eq!(apply(DateUnit::Month, 59.0), 2);
        assert_eq!(apply(DateUnit::DayOfYear, 59.0), 59);

        // Serial 60 is the nonexistent 1900-02-29.
        assert_eq!(apply(DateUnit::Year, 60.0), 1900);
        assert_eq!(apply(DateUnit::Month, 60.0), 2);
        assert_eq!(apply(DateUnit::DayOfYear, 60.0), 60);
        assert_eq!(apply(DateUnit::Hour, 60.5), 13);

        // Serial 61 is 1900-03-01.
        assert_eq!(apply(DateUnit::Month, 61.0), 3);
        assert_eq!(apply(DateUnit::CalendarQuarter, 61.0), 1);

        let noon = SerialDateTime::from_serial(61.5).unwrap();
        assert_eq!(
            noon.datetime,
            NaiveDate::from_ymd_opt(1900, 3, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap()
        );
        assert_eq!(
            SerialDateTime::from_serial(1.0).unwrap().datetime.date(),
            NaiveDate::from_ymd_opt(1900, 1, 1).unwrap()
        );
    }

    #[test]
    fn serials_outside_the_date_system_have_no_bucket() {
        let year = Bucketer::date(DateUnit::Year);
        assert_eq!(year.apply(Some(&Value::number(-1.0))), BUCKET_NONE);
        assert_eq!(year.apply(Some(&Value::number(DATE_SERIAL_END))), BUCKET_NONE);
        // 9999-12-31 23:00
        assert_eq!(year.apply(Some(&Value::number(DATE_SERIAL_END - 1.0 / 24.0))), 9999);
    }

    #[test]
    fn date_bounds_clamp_to_outer_buckets() {
        let bucketer = Bucketer::Date {
            unit: DateUnit::Month,
            minimum: Some(45_292.0),
            maximum: Some(45_657.0),
        };
        assert_eq!(bucketer.apply(Some(&Value::number(45_000.0))), BUCKET_BEFORE_RANGE);
        assert_eq!(bucketer.apply(Some(&Value::number(46_000.0))), i64::MAX);
        assert_eq!(bucketer.apply(Some(&Value::number(45_292.0))), 1);
    }

    #[test]
    fn series_buckets_are_one_based_with_outer_ranges() {
        let bucketer = Bucketer::series(0.0, 100.0, 10.0);
        bucketer.validate().unwrap();

        assert_eq!(bucketer.apply(Some(&Value::number(-5.0))), 0);
        assert_eq!(bucketer.apply(Some(&Value::number(0.0))), 1);
        assert_eq!(bucketer.apply(Some(&Value::number(9.99))), 1);
        assert_eq!(bucketer.apply(Some(&Value::number(10.0))), 2);
        assert_eq!(bucketer.apply(Some(&Value::number(100.0))), 11);
        assert_eq!(bucketer.apply(Some(&Value::number(100.5))), 12);
    }

    #[test]
    fn tiny_series_step_is_rejected_and_never_overflows() {
        let tiny = Bucketer::series(0.0, 10.0, 1e-300);
        assert!(matches!(tiny.validate(), Err(CacheError::InvalidBucketer(_))));
        assert!(crate::field::CacheField::new("band").with_bucketer(tiny).is_err());

        // Unvalidated rules saturate instead of wrapping.
        assert_eq!(tiny.apply(Some(&Value::number(-1.0))), BUCKET_BEFORE_RANGE);
        assert_eq!(tiny.apply(Some(&Value::number(5.0))), i64::MAX);
        assert_eq!(tiny.apply(Some(&Value::number(11.0))), i64::MAX);
        assert_eq!(
            Bucketer::series(0.0, 10.0, 0.0).apply(Some(&Value::number(3.0))),
            i64::MAX
        );

        // The finest accepted step still yields distinct, ordered buckets.
        let fine = Bucketer::series(0.0, 1.0, 2e-16);
        fine.validate().unwrap();
        let low = fine.apply(Some(&Value::number(0.25)));
        let high = fine.apply(Some(&Value::number(0.75)));
        let above = fine.apply(Some(&Value::number(2.0)));
        assert!(BUCKET_BEFORE_RANGE < low && low < high && high < above);
    }

    #[test]
    fn non_numeric_and_missing_values_have_no_bucket() {
        let bucketer = Bucketer::series(0.0, 10.0, 1.0);
        assert_eq!(bucketer.apply(None), BUCKET_NONE);
        assert_eq!(bucketer.apply(Some(&Value::text("x"))), BUCKET_NONE);
        assert_eq!(bucketer.apply(Some(&Value::number(f64::NAN))), BUCKET_NONE);
    }

    #[test]
    fn validate_rejects_degenerate_rules() {
        assert!(Bucketer::series(0.0, 10.0, 0.0).validate().is_err());
        assert!(Bucketer::series(10.0, 0.0, 1.0).validate().is_err());
        assert!(Bucketer::series(0.0, f64::INFINITY, 1.0).validate().is_err());
        let reversed = Bucketer::Date {
            unit: DateUnit::Year,
            minimum: Some(2.0),
            maximum: Some(1.0),
        };
        assert!(matches!(
            reversed.validate(),
            Err(CacheError::InvalidBucketer(_))
        ));
    }
}

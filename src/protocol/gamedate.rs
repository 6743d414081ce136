//! Game date → calendar date.
//!
//! A game date counts days since 1 January of year 0 in the proleptic Gregorian
//! calendar (year 0 is a leap year, so day 366 is 0001-01-01).

use chrono::{Days, NaiveDate};

use super::errors::{DecodeError, DecodeResult};

/// Convert a raw game date
pub fn to_date(days: u64) -> DecodeResult<NaiveDate> {
    NaiveDate::from_ymd_opt(0, 1, 1)
        .and_then(|epoch| epoch.checked_add_days(Days::new(days)))
        .ok_or(DecodeError::DateOutOfRange(days))
}

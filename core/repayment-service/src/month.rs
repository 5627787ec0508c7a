// core/repayment-service/src/month.rs
// Calendar month keys ("YYYY-MM") used to bucket schedules and repayments

use chrono::{DateTime, Datelike, Months, Utc};
use loanpay_common::ValidationError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self, ValidationError> {
        if !(1..=12).contains(&month) {
            return Err(ValidationError::InvalidMonth(format!(
                "{:04}-{:02}",
                year, month
            )));
        }
        Ok(Self { year, month })
    }

    pub fn from_date<T: Datelike>(date: &T) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// "2025-01" -> "January 2025"
    pub fn display_name(&self) -> String {
        format!("{} {}", MONTH_NAMES[(self.month - 1) as usize], self.year)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidMonth(s.to_string());

        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }

        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;

        MonthKey::new(year, month).map_err(|_| invalid())
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Add calendar months, clamping the day to the end of the target month.
pub fn add_months(date: DateTime<Utc>, months: u32) -> Option<DateTime<Utc>> {
    date.checked_add_months(Months::new(months))
}

/// Midnight UTC on the given day.
#[cfg(test)]
pub fn utc_date(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
    use chrono::{NaiveDate, TimeZone};

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

//! Calendar helpers: answer parsing, ages and countdowns.

use chrono::{DateTime, Datelike, NaiveDate};
use serde::Serialize;
use serde_json::Value;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (its calendar date is used).
pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    value.as_str().and_then(parse_date_str)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Whole years elapsed between `birth` and `today`.
///
/// The year only counts once the birthday has been reached, so 2000-06-15
/// is 23 on 2024-06-14 and 24 on 2024-06-15. `None` for future dates.
pub fn calculate_age(birth: NaiveDate, today: NaiveDate) -> Option<u32> {
    if birth > today {
        return None;
    }
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

/// Plain year subtraction, matching how the clinic records marriage age.
pub fn marriage_age(birth: NaiveDate, marriage_year: i64) -> i64 {
    marriage_year - i64::from(birth.year())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "days", rename_all = "snake_case")]
pub enum DaysUntil {
    Today,
    Days(i64),
}

/// Countdown to an upcoming date; `None` once it has passed.
pub fn days_until(target: NaiveDate, today: NaiveDate) -> Option<DaysUntil> {
    match (target - today).num_days() {
        days if days < 0 => None,
        0 => Some(DaysUntil::Today),
        days => Some(DaysUntil::Days(days)),
    }
}

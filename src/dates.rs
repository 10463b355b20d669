use chrono::{Local, Months, NaiveDate, TimeDelta};

use crate::date_range::DateRange;
use crate::error::{Error, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Resolves a loosely written date relative to `today`.
///
/// Understands `2020-03-15`, `2020-03` (first of the month), `today`,
/// `yesterday` and `<n> day|week|month|year[s] ago`.
pub fn resolve_date(input: &str, today: NaiveDate) -> Result<NaiveDate> {
    let text = input.trim().to_lowercase();
    let fail = || Error::DateParse(input.to_string());

    if let Ok(date) = NaiveDate::parse_from_str(&text, DATE_FORMAT) {
        return Ok(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", text), DATE_FORMAT) {
        return Ok(date);
    }

    match text.as_str() {
        "today" => return Ok(today),
        "yesterday" => return Ok(today - TimeDelta::days(1)),
        _ => {}
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    let [amount, unit, "ago"] = words.as_slice() else {
        return Err(fail());
    };
    let amount: u32 = amount.parse().map_err(|_| fail())?;

    let resolved = match unit.trim_end_matches('s') {
        "day" => today.checked_sub_signed(TimeDelta::days(i64::from(amount))),
        "week" => today.checked_sub_signed(TimeDelta::weeks(i64::from(amount))),
        "month" => today.checked_sub_months(Months::new(amount)),
        "year" => amount
            .checked_mul(12)
            .and_then(|months| today.checked_sub_months(Months::new(months))),
        _ => None,
    };

    resolved.ok_or_else(fail)
}

/// The range covering the last `days` days up to and including `today`.
pub fn last_days(days: u32, today: NaiveDate) -> Result<DateRange> {
    let start = today
        .checked_sub_signed(TimeDelta::days(i64::from(days)))
        .unwrap_or(NaiveDate::MIN);
    DateRange::new(start, today)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn resolves_absolute_dates() {
        let today = day("2020-08-22");
        assert_eq!(resolve_date("2020-03-15", today).unwrap(), day("2020-03-15"));
        assert_eq!(resolve_date(" 2020-03 ", today).unwrap(), day("2020-03-01"));
    }

    #[test]
    fn resolves_relative_dates() {
        let today = day("2020-08-22");
        assert_eq!(resolve_date("today", today).unwrap(), today);
        assert_eq!(resolve_date("Yesterday", today).unwrap(), day("2020-08-21"));
        assert_eq!(resolve_date("3 days ago", today).unwrap(), day("2020-08-19"));
        assert_eq!(resolve_date("1 week ago", today).unwrap(), day("2020-08-15"));
        assert_eq!(resolve_date("2 months ago", today).unwrap(), day("2020-06-22"));
        assert_eq!(resolve_date("1 year ago", today).unwrap(), day("2019-08-22"));
    }

    #[test]
    fn rejects_gibberish() {
        let today = day("2020-08-22");
        for input in ["", "soon", "three days ago", "2 fortnights ago", "2020-13-01"] {
            assert!(
                matches!(resolve_date(input, today), Err(Error::DateParse(_))),
                "{input:?} should not resolve"
            );
        }
    }

    #[test]
    fn last_days_ends_today() {
        let range = last_days(30, day("2020-08-22")).unwrap();
        assert_eq!(range.start(), day("2020-07-23"));
        assert_eq!(range.end(), day("2020-08-22"));
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::Weekday;

use crate::error::Error;

pub const MAX_DAY_INTERVAL: u32 = 365;

/// How a date range is split into sub-queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Weekday(Weekday),
    Weekdays,
    Weekends,
    /// Consecutive windows of this many days.
    Interval(u32),
}

const NAMED_INTERVALS: &[(&str, u32)] = &[
    ("daily", 1),
    ("twodaily", 2),
    ("threedaily", 3),
    ("fourdaily", 4),
    ("fivedaily", 5),
    ("sixdaily", 6),
    ("weekly", 7),
    ("twoweekly", 14),
    ("threeweekly", 21),
    ("monthly", 30),
    ("twomonthly", 60),
    ("quarterly", 90),
    ("yearly", 365),
];

const WEEKDAY_NAMES: &[(&str, Weekday)] = &[
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

impl Granularity {
    /// One query per day, the same as giving no granularity at all.
    pub fn is_daily(&self) -> bool {
        matches!(self, Granularity::Interval(1))
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();

        match name.as_str() {
            "weekdays" => return Ok(Granularity::Weekdays),
            "weekends" => return Ok(Granularity::Weekends),
            _ => {}
        }

        if let Some((_, day)) = WEEKDAY_NAMES.iter().find(|(n, _)| *n == name) {
            return Ok(Granularity::Weekday(*day));
        }

        if let Some((_, days)) = NAMED_INTERVALS.iter().find(|(n, _)| *n == name) {
            return Ok(Granularity::Interval(*days));
        }

        match name.parse::<u32>() {
            Ok(days) if (1..=MAX_DAY_INTERVAL).contains(&days) => Ok(Granularity::Interval(days)),
            _ => Err(Error::UnknownGranularity(s.to_string())),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Weekday(day) => {
                let name = WEEKDAY_NAMES
                    .iter()
                    .find(|(_, d)| d == day)
                    .map(|(n, _)| *n)
                    .unwrap_or("weekday");
                f.write_str(name)
            }
            Granularity::Weekdays => f.write_str("weekdays"),
            Granularity::Weekends => f.write_str("weekends"),
            Granularity::Interval(days) => match NAMED_INTERVALS.iter().find(|(_, d)| d == days) {
                Some((name, _)) => f.write_str(name),
                None => write!(f, "{}", days),
            },
        }
    }
}

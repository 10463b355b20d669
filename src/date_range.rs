use chrono::{Datelike, NaiveDate, TimeDelta, Weekday};

use crate::error::{Error, Result};
use crate::granularity::Granularity;

/// Inclusive calendar date range, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days covered, both ends included.
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn days(self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

/// Date units produced by [`partition`], consumed by the body builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Partition {
    /// One query per listed day.
    Days(Vec<NaiveDate>),
    /// Window boundaries. Each consecutive pair `[d[i], d[i+1])` is one
    /// window; the last entry is an exclusive sentinel one day past the end.
    Boundaries(Vec<NaiveDate>),
    /// Inclusive spans, one query each.
    Spans(Vec<DateRange>),
}

impl Partition {
    /// Number of queries this partition turns into.
    pub fn unit_count(&self) -> usize {
        match self {
            Partition::Days(days) => days.len(),
            Partition::Boundaries(bounds) => bounds.len().saturating_sub(1),
            Partition::Spans(spans) => spans.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.unit_count() == 0
    }
}

/// Splits `range` according to `granularity`.
///
/// Weekend and weekday partitions may reach outside `range` so that every
/// weekend (Sat-Sun) or work week (Mon-Fri) touched by it is queried whole.
pub fn partition(range: DateRange, granularity: Option<Granularity>) -> Result<Partition> {
    let partition = match granularity {
        None => Partition::Days(range.days().collect()),
        Some(g) if g.is_daily() => Partition::Days(range.days().collect()),
        Some(Granularity::Weekday(day)) => {
            Partition::Days(range.days().filter(|d| d.weekday() == day).collect())
        }
        Some(Granularity::Weekends) => weekend_spans(range),
        Some(Granularity::Weekdays) => work_week_spans(range),
        Some(Granularity::Interval(interval)) => interval_boundaries(range, interval)?,
    };

    tracing::debug!(
        start = %range.start(),
        end = %range.end(),
        units = partition.unit_count(),
        "partitioned date range"
    );

    Ok(partition)
}

fn weekend_spans(range: DateRange) -> Partition {
    let mut days: Vec<NaiveDate> = range
        .days()
        .filter(|d| matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect();

    if let Some(first) = days.first().copied() {
        if first.weekday() == Weekday::Sun {
            days.insert(0, first - TimeDelta::days(1));
        }
    }
    if let Some(last) = days.last().copied() {
        if last.weekday() == Weekday::Sat {
            days.push(last + TimeDelta::days(1));
        }
    }

    Partition::Spans(pair_up(&days))
}

fn work_week_spans(range: DateRange) -> Partition {
    let mut markers: Vec<NaiveDate> = range
        .days()
        .filter(|d| matches!(d.weekday(), Weekday::Mon | Weekday::Fri))
        .collect();

    // Tue..Thu inside one week has no marker of its own.
    if markers.is_empty() {
        if let Some(midweek) = range.days().find(|d| d.weekday().number_from_monday() <= 5) {
            let monday = midweek - TimeDelta::days(i64::from(midweek.weekday().num_days_from_monday()));
            markers = vec![monday, monday + TimeDelta::days(4)];
        }
    }

    if let Some(first) = markers.first().copied() {
        if first.weekday() == Weekday::Fri {
            markers.insert(0, first - TimeDelta::days(4));
        }
    }
    if let Some(last) = markers.last().copied() {
        if last.weekday() == Weekday::Mon {
            markers.push(last + TimeDelta::days(4));
        }
    }

    Partition::Spans(pair_up(&markers))
}

// Input alternates opening and closing days after the boundary fix-ups.
fn pair_up(days: &[NaiveDate]) -> Vec<DateRange> {
    days.chunks_exact(2)
        .map(|pair| DateRange {
            start: pair[0],
            end: pair[1],
        })
        .collect()
}

fn interval_boundaries(range: DateRange, interval: u32) -> Result<Partition> {
    let span = range.span_days();
    if i64::from(interval) > span {
        return Err(Error::GranularityTooCoarse { interval, span });
    }

    let mut bounds: Vec<NaiveDate> = (0..span)
        .step_by(interval as usize)
        .map(|offset| range.start() + TimeDelta::days(offset))
        .collect();
    bounds.push(range.end() + TimeDelta::days(1));

    Ok(Partition::Boundaries(bounds))
}

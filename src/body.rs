use std::str::FromStr;

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::date_range::{DateRange, Partition};
use crate::error::Error;

/// Largest page the search analytics endpoint returns.
pub const PAGE_CAP: u32 = 25_000;

pub const ALL_DIMENSIONS: &[&str] = &["date", "page", "query", "country", "device"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub dimension: String,
    pub operator: String,
    pub expression: String,
}

impl FromStr for FilterGroup {
    type Err = Error;

    /// `"country equals FRA"`; everything after the operator is the expression.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(dimension), Some(operator)) => {
                let expression = parts.collect::<Vec<_>>().join(" ");
                if expression.is_empty() {
                    return Err(Error::InvalidQuery(format!("filter {:?} has no expression", s)));
                }
                Ok(FilterGroup {
                    dimension: dimension.to_string(),
                    operator: operator.to_string(),
                    expression,
                })
            }
            _ => Err(Error::InvalidQuery(format!(
                "filter {:?} must look like `<dimension> <operator> <expression>`",
                s
            ))),
        }
    }
}

/// One search analytics request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBody {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub dimensions: Vec<String>,
    pub search_type: Option<String>,
    pub row_limit: u32,
    pub start_row: u32,
    pub filters: Vec<FilterGroup>,
}

impl QueryBody {
    pub fn new(range: DateRange) -> Self {
        Self {
            start_date: range.start(),
            end_date: range.end(),
            dimensions: Vec::new(),
            search_type: None,
            row_limit: PAGE_CAP,
            start_row: 0,
            filters: Vec::new(),
        }
    }

    /// Expands `"all"` to every dimension the endpoint knows.
    pub fn with_dimensions<I, S>(mut self, dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dimensions: Vec<String> = dimensions.into_iter().map(Into::into).collect();
        self.dimensions = if dimensions.iter().any(|d| d == "all") {
            ALL_DIMENSIONS.iter().map(|d| d.to_string()).collect()
        } else {
            dimensions
        };
        self
    }

    pub fn with_search_type(mut self, search_type: impl Into<String>) -> Self {
        self.search_type = Some(search_type.into());
        self
    }

    /// Clamped to the page cap.
    pub fn with_row_limit(mut self, row_limit: u32) -> Self {
        self.row_limit = row_limit.clamp(1, PAGE_CAP);
        self
    }

    pub fn with_start_row(mut self, start_row: u32) -> Self {
        self.start_row = start_row;
        self
    }

    pub fn with_filters(mut self, filters: Vec<FilterGroup>) -> Self {
        self.filters = filters;
        self
    }

    /// Snapshot of this body for a different date window.
    pub fn for_dates(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start_date: start,
            end_date: end,
            ..self.clone()
        }
    }

    /// Same query, next page.
    pub fn overflow(&self, page_cap: u32) -> Self {
        Self {
            start_row: self.start_row.saturating_add(page_cap),
            ..self.clone()
        }
    }
}

/// One body per date unit of `partition`, all other fields copied from `base`.
pub fn build_bodies(base: &QueryBody, partition: &Partition) -> Vec<QueryBody> {
    match partition {
        Partition::Days(days) => days.iter().map(|d| base.for_dates(*d, *d)).collect(),
        Partition::Boundaries(bounds) => bounds
            .windows(2)
            .map(|w| base.for_dates(w[0], w[1] - TimeDelta::days(1)))
            .collect(),
        Partition::Spans(spans) => spans
            .iter()
            .map(|s| base.for_dates(s.start(), s.end()))
            .collect(),
    }
}

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use seoman_rs::progress::ProgressSink;
use seoman_rs::prompt::ConfirmGate;
use seoman_rs::{
    DateRange, Error, FetchConfig, QueryBody, QueryExecutor, QueryResponse, Reauthenticator,
    RemoteError, RowRecord,
};

pub const SITE: &str = "sc-domain:example.com";

pub fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn range(start: &str, end: &str) -> DateRange {
    DateRange::new(day(start), day(end)).unwrap()
}

pub fn fast_config() -> FetchConfig {
    FetchConfig {
        retry_backoff: Duration::ZERO,
        ..FetchConfig::default()
    }
}

pub fn row(body: &QueryBody, index: usize) -> RowRecord {
    RowRecord {
        keys: vec![
            body.start_date.to_string(),
            format!("{}", body.start_row as usize + index),
        ],
        clicks: 1.0,
        impressions: 10.0,
        ctr: 0.1,
        position: 3.5,
    }
}

type RowCount = Box<dyn Fn(&QueryBody) -> usize + Send + Sync>;

/// In-memory stand-in for the remote service.
pub struct FakeExecutor {
    rows_for: RowCount,
    planned_failures: Mutex<HashMap<(NaiveDate, u32), VecDeque<RemoteError>>>,
    delay_for: Option<Box<dyn Fn(&QueryBody) -> Duration + Send + Sync>>,
    calls: Mutex<Vec<QueryBody>>,
}

impl FakeExecutor {
    pub fn new(rows_for: impl Fn(&QueryBody) -> usize + Send + Sync + 'static) -> Self {
        Self {
            rows_for: Box::new(rows_for),
            planned_failures: Mutex::new(HashMap::new()),
            delay_for: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_rows(count: usize) -> Self {
        Self::new(move |_| count)
    }

    /// The first calls for the body starting on `start` fail with `errors`.
    pub fn failing(self, start: NaiveDate, errors: Vec<RemoteError>) -> Self {
        self.failing_page(start, 0, errors)
    }

    pub fn failing_page(self, start: NaiveDate, start_row: u32, errors: Vec<RemoteError>) -> Self {
        self.planned_failures
            .lock()
            .unwrap()
            .insert((start, start_row), errors.into());
        self
    }

    pub fn delayed(mut self, delay_for: impl Fn(&QueryBody) -> Duration + Send + Sync + 'static) -> Self {
        self.delay_for = Some(Box::new(delay_for));
        self
    }

    pub fn calls(&self) -> Vec<QueryBody> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, start: NaiveDate) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.start_date == start)
            .count()
    }
}

#[async_trait]
impl QueryExecutor for FakeExecutor {
    async fn execute(&self, _site_url: &str, body: &QueryBody) -> Result<QueryResponse, RemoteError> {
        self.calls.lock().unwrap().push(body.clone());

        if let Some(delay_for) = &self.delay_for {
            tokio::time::sleep(delay_for(body)).await;
        }

        let planned = self
            .planned_failures
            .lock()
            .unwrap()
            .get_mut(&(body.start_date, body.start_row))
            .and_then(|errors| errors.pop_front());
        if let Some(error) = planned {
            return Err(error);
        }

        let count = (self.rows_for)(body);
        Ok(QueryResponse {
            rows: (0..count).map(|i| row(body, i)).collect(),
            response_aggregation_type: None,
        })
    }
}

/// Fixed answer that counts how often it was asked.
pub struct CountingGate {
    answer: bool,
    asked: AtomicUsize,
}

impl CountingGate {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl ConfirmGate for CountingGate {
    fn confirm(&self, _prompt: &str) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

pub struct CountingReauth {
    succeed: bool,
    calls: AtomicUsize,
}

impl CountingReauth {
    pub fn new(succeed: bool) -> Self {
        Self {
            succeed,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reauthenticator for CountingReauth {
    async fn reauthenticate(&self) -> Result<(), Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.succeed {
            Ok(())
        } else {
            Err(Error::AuthFailed("refresh token revoked".to_string()))
        }
    }
}

#[derive(Default)]
pub struct RecordingProgress {
    pub reports: Mutex<Vec<(usize, usize)>>,
}

impl ProgressSink for RecordingProgress {
    fn report(&self, completed: usize, total: usize) {
        self.reports.lock().unwrap().push((completed, total));
    }
}

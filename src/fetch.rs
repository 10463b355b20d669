use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use crate::body::{PAGE_CAP, QueryBody};
use crate::client::{QueryExecutor, QueryResponse, RowRecord};
use crate::error::{Error, RemoteError, Result};
use crate::progress::{NoProgress, ProgressSink};

pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Queries in flight at once. Rows are still merged in dispatch order.
    pub concurrency: usize,
    pub page_cap: u32,
    pub retry_backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            page_cap: PAGE_CAP,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Rows collected by one or more passes, in dispatch order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FetchResult {
    rows: Vec<RowRecord>,
}

impl FetchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[RowRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = RowRecord>) {
        self.rows.extend(rows);
    }

    /// Moves every row of `other` to the end of this result.
    pub fn append(&mut self, mut other: FetchResult) {
        self.rows.append(&mut other.rows);
    }

    pub fn into_rows(self) -> Vec<RowRecord> {
        self.rows
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    First,
    Overflow,
}

/// A query that produced no rows because the remote call kept failing.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchFailure {
    pub body: QueryBody,
    pub error: RemoteError,
}

#[derive(Debug, Default)]
pub struct PassOutcome {
    pub rows: FetchResult,
    /// Follow-up queries for first-pass bodies whose response filled a page.
    pub overflow: Vec<QueryBody>,
    pub failures: Vec<FetchFailure>,
}

/// Executes query bodies against the remote service and merges the rows.
///
/// A failed query never aborts the pass: retryable failures get one more
/// attempt after `retry_backoff`, and whatever still fails is recorded in
/// [`PassOutcome::failures`]. Expired credentials are the exception and
/// end the pass with [`RemoteError::AuthExpired`].
pub struct FetchScheduler<E: QueryExecutor + ?Sized> {
    executor: Arc<E>,
    config: FetchConfig,
    progress: Arc<ProgressFactory>,
}

/// Hands out the progress sink for each pass as it starts.
pub type ProgressFactory = dyn Fn(PassKind) -> Arc<dyn ProgressSink> + Send + Sync;

impl<E: QueryExecutor + ?Sized> FetchScheduler<E> {
    pub fn new(executor: Arc<E>, config: FetchConfig) -> Self {
        Self {
            executor,
            config,
            progress: Arc::new(|_: PassKind| -> Arc<dyn ProgressSink> { Arc::new(NoProgress) }),
        }
    }

    /// Reports every pass to the same sink.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Arc::new(move |_: PassKind| progress.clone());
        self
    }

    /// Asks `make` for a fresh sink whenever a pass starts, including a pass
    /// rerun after re-authentication.
    pub fn with_pass_progress(
        mut self,
        make: impl Fn(PassKind) -> Arc<dyn ProgressSink> + Send + Sync + 'static,
    ) -> Self {
        self.progress = Arc::new(make);
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub async fn fetch_first_pass(&self, site_url: &str, bodies: &[QueryBody]) -> Result<PassOutcome> {
        self.run_pass(site_url, bodies, PassKind::First).await
    }

    /// Pages past the cap never overflow again, so this pass records no
    /// further overflow bodies.
    pub async fn fetch_overflow_pass(
        &self,
        site_url: &str,
        bodies: &[QueryBody],
    ) -> Result<PassOutcome> {
        self.run_pass(site_url, bodies, PassKind::Overflow).await
    }

    async fn run_pass(&self, site_url: &str, bodies: &[QueryBody], kind: PassKind) -> Result<PassOutcome> {
        let total = bodies.len();
        let page_cap = self.config.page_cap;
        let mut outcome = PassOutcome::default();
        let mut completed = 0;
        let progress = (self.progress)(kind);

        tracing::debug!(?kind, total, concurrency = self.config.concurrency, "starting fetch pass");

        let mut responses = futures::stream::iter(bodies)
            .map(|body| async move { (body, self.dispatch(site_url, body).await) })
            .buffered(self.config.concurrency.max(1));

        while let Some((body, response)) = responses.next().await {
            completed += 1;
            progress.report(completed, total);

            match response {
                Ok(response) => {
                    if kind == PassKind::First && response.rows.len() >= page_cap as usize {
                        tracing::debug!(start = %body.start_date, end = %body.end_date, "response filled a page");
                        outcome.overflow.push(body.overflow(page_cap));
                    }
                    outcome.rows.extend(response.rows);
                }
                Err(RemoteError::AuthExpired) => {
                    return Err(Error::Remote(RemoteError::AuthExpired));
                }
                Err(error) => {
                    tracing::warn!(
                        start = %body.start_date,
                        end = %body.end_date,
                        %error,
                        "dropping query after failure"
                    );
                    outcome.failures.push(FetchFailure {
                        body: body.clone(),
                        error,
                    });
                }
            }
        }

        tracing::info!(
            ?kind,
            queries = total,
            rows = outcome.rows.len(),
            overflow = outcome.overflow.len(),
            failed = outcome.failures.len(),
            "fetch pass finished"
        );

        Ok(outcome)
    }

    async fn dispatch(&self, site_url: &str, body: &QueryBody) -> Result<QueryResponse, RemoteError> {
        match self.executor.execute(site_url, body).await {
            Err(error) if error.is_retryable() => {
                tracing::warn!(%error, backoff = ?self.config.retry_backoff, "retrying query once");
                tokio::time::sleep(self.config.retry_backoff).await;
                self.executor.execute(site_url, body).await
            }
            other => other,
        }
    }
}

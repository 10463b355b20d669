use crate::body::QueryBody;
use crate::client::QueryExecutor;
use crate::error::{Error, Result};
use crate::fetch::{FetchFailure, FetchResult, FetchScheduler, PassOutcome};
use crate::prompt::ConfirmGate;
use crate::reauth::CredentialRetry;

/// Everything a fetch produced, ready for export.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub result: FetchResult,
    pub failures: Vec<FetchFailure>,
    /// Overflow queries the user chose not to run.
    pub skipped_overflow: usize,
}

impl FetchReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty() || self.skipped_overflow > 0
    }
}

/// Runs the first pass, asks `overflow_gate` whether to follow up on
/// responses that filled a page, and merges both passes in order.
///
/// Each pass runs under `retry`, so expired credentials can be refreshed
/// and the pass rerun from scratch.
pub async fn fetch_report<E: QueryExecutor + ?Sized>(
    scheduler: &FetchScheduler<E>,
    retry: &CredentialRetry<'_>,
    overflow_gate: &dyn ConfirmGate,
    site_url: &str,
    bodies: &[QueryBody],
) -> Result<FetchReport> {
    let PassOutcome {
        rows: mut result,
        overflow,
        mut failures,
    } = retry
        .run(move || scheduler.fetch_first_pass(site_url, bodies))
        .await?;

    let mut skipped_overflow = 0;
    if !overflow.is_empty() {
        let prompt = format!(
            "More than {} rows found for {} queries, do you want to include them too?",
            scheduler.config().page_cap,
            overflow.len()
        );

        if overflow_gate.confirm(&prompt) {
            let overflow = overflow.as_slice();
            let second = retry
                .run(move || scheduler.fetch_overflow_pass(site_url, overflow))
                .await?;
            result.append(second.rows);
            failures.extend(second.failures);
        } else {
            tracing::info!(queries = overflow.len(), "skipping rows past the first page");
            skipped_overflow = overflow.len();
        }
    }

    if result.is_empty() {
        return Err(Error::EmptyResult);
    }

    Ok(FetchReport {
        result,
        failures,
        skipped_overflow,
    })
}

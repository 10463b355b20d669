use serde::Serialize;

use crate::body::QueryBody;
use crate::client::QueryExecutor;
use crate::date_range::DateRange;
use crate::error::{Error, RemoteError, Result};
use crate::progress::ProgressSink;

/// Totals for one property over a date range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteTraffic {
    pub site_url: String,
    pub clicks: f64,
    pub impressions: f64,
    pub ctr: f64,
    pub position: f64,
}

impl SiteTraffic {
    fn empty(site_url: &str) -> Self {
        Self {
            site_url: site_url.to_string(),
            clicks: 0.0,
            impressions: 0.0,
            ctr: 0.0,
            position: 0.0,
        }
    }
}

/// Queries each site once without dimensions and returns the totals,
/// busiest first (clicks, then impressions).
///
/// A site whose query fails is logged and left out. Expired credentials
/// abort the listing so the caller can re-authenticate.
pub async fn site_traffic<E: QueryExecutor + ?Sized>(
    executor: &E,
    sites: &[String],
    range: DateRange,
    progress: &dyn ProgressSink,
) -> Result<Vec<SiteTraffic>> {
    let body = QueryBody::new(range);
    let mut traffic = Vec::with_capacity(sites.len());

    for (i, site_url) in sites.iter().enumerate() {
        match executor.execute(site_url, &body).await {
            Ok(response) => {
                let totals = response.rows.into_iter().next().map(|row| SiteTraffic {
                    site_url: site_url.clone(),
                    clicks: row.clicks,
                    impressions: row.impressions,
                    ctr: row.ctr,
                    position: row.position,
                });
                traffic.push(totals.unwrap_or_else(|| SiteTraffic::empty(site_url)));
            }
            Err(RemoteError::AuthExpired) => return Err(Error::Remote(RemoteError::AuthExpired)),
            Err(error) => tracing::warn!(site = %site_url, %error, "skipping site traffic"),
        }
        progress.report(i + 1, sites.len());
    }

    traffic.sort_by(|a, b| {
        b.clicks
            .total_cmp(&a.clicks)
            .then(b.impressions.total_cmp(&a.impressions))
    });

    Ok(traffic)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::*;
    use crate::client::{QueryResponse, RowRecord};
    use crate::progress::NoProgress;

    /// Serves fixed totals per site and records the bodies it saw.
    struct Totals {
        seen: Mutex<Vec<QueryBody>>,
    }

    #[async_trait]
    impl QueryExecutor for Totals {
        async fn execute(&self, site_url: &str, body: &QueryBody) -> Result<QueryResponse, RemoteError> {
            self.seen.lock().unwrap().push(body.clone());
            let (clicks, impressions) = match site_url {
                "a" => (10.0, 500.0),
                "b" => (40.0, 900.0),
                "c" => (10.0, 800.0),
                "empty" => return Ok(QueryResponse::default()),
                "expired" => return Err(RemoteError::AuthExpired),
                _ => return Err(RemoteError::Rejected("no permission".into())),
            };
            Ok(QueryResponse {
                rows: vec![RowRecord {
                    keys: Vec::new(),
                    clicks,
                    impressions,
                    ctr: clicks / impressions,
                    position: 7.0,
                }],
                response_aggregation_type: None,
            })
        }
    }

    fn totals() -> Totals {
        Totals {
            seen: Mutex::new(Vec::new()),
        }
    }

    fn month() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2020, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2020, 3, 31).unwrap(),
        )
        .unwrap()
    }

    fn sites(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn busiest_sites_come_first() {
        let executor = totals();
        let traffic = site_traffic(&executor, &sites(&["a", "empty", "b", "c"]), month(), &NoProgress)
            .await
            .unwrap();

        let order: Vec<&str> = traffic.iter().map(|t| t.site_url.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a", "empty"]);
        assert_eq!(traffic[3].clicks, 0.0);

        let seen = executor.seen.lock().unwrap();
        assert!(seen.iter().all(|b| b.dimensions.is_empty()));
        assert_eq!(seen[0].start_date, month().start());
        assert_eq!(seen[0].end_date, month().end());
    }

    #[tokio::test]
    async fn failing_sites_are_left_out() {
        let traffic = site_traffic(&totals(), &sites(&["a", "forbidden"]), month(), &NoProgress)
            .await
            .unwrap();
        assert_eq!(traffic.len(), 1);
    }

    #[tokio::test]
    async fn expired_credentials_abort() {
        let err = site_traffic(&totals(), &sites(&["a", "expired", "b"]), month(), &NoProgress)
            .await
            .unwrap_err();
        assert!(err.is_auth_expired());
    }
}

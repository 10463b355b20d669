use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::body::{FilterGroup, QueryBody};
use crate::dates::format_date;
use crate::error::{RemoteError, Result};

pub const API_BASE_URL: &str = "https://www.googleapis.com/webmasters/v3";
const TIMEOUT_SECONDS: u64 = 60;

/// One row of a search analytics report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    /// Dimension values, in the order the dimensions were requested.
    #[serde(default)]
    pub keys: Vec<String>,
    pub clicks: f64,
    pub impressions: f64,
    pub ctr: f64,
    pub position: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// Absent when the query matched nothing.
    #[serde(default)]
    pub rows: Vec<RowRecord>,
    #[serde(default)]
    pub response_aggregation_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteEntry {
    pub site_url: String,
    pub permission_level: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SiteList {
    #[serde(default)]
    site_entry: Vec<SiteEntry>,
}

/// A sitemap submitted for a property. Counts come back as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitemapEntry {
    pub path: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub last_submitted: Option<String>,
    #[serde(default)]
    pub last_downloaded: Option<String>,
    #[serde(default)]
    pub is_pending: bool,
    #[serde(default)]
    pub is_sitemaps_index: bool,
    #[serde(default)]
    pub warnings: Option<String>,
    #[serde(default)]
    pub errors: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SitemapList {
    #[serde(default)]
    sitemap: Vec<SitemapEntry>,
}

/// Runs a single search analytics query.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, site_url: &str, body: &QueryBody) -> Result<QueryResponse, RemoteError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    start_date: String,
    end_date: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dimensions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    search_type: Option<String>,
    row_limit: u32,
    start_row: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dimension_filter_groups: Vec<FilterSet>,
}

#[derive(Debug, Serialize)]
struct FilterSet {
    filters: Vec<FilterGroup>,
}

impl From<&QueryBody> for QueryRequest {
    fn from(body: &QueryBody) -> Self {
        let dimension_filter_groups = if body.filters.is_empty() {
            Vec::new()
        } else {
            vec![FilterSet {
                filters: body.filters.clone(),
            }]
        };

        QueryRequest {
            start_date: format_date(body.start_date),
            end_date: format_date(body.end_date),
            dimensions: body.dimensions.clone(),
            search_type: body.search_type.clone(),
            row_limit: body.row_limit,
            start_row: body.start_row,
            dimension_filter_groups,
        }
    }
}

/// Search Console REST client.
///
/// The bearer token sits behind a lock so a refreshed one can be installed
/// while the client is shared with a running fetch.
pub struct SearchConsole {
    http_client: reqwest::Client,
    base_url: String,
    token: RwLock<String>,
}

impl SearchConsole {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECONDS))
            .build()?;

        Ok(Self {
            http_client,
            base_url: API_BASE_URL.to_string(),
            token: RwLock::new(token.into()),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn set_token(&self, token: impl Into<String>) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = token.into();
    }

    fn token(&self) -> String {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Verified properties of the account.
    pub async fn sites(&self) -> Result<Vec<SiteEntry>, RemoteError> {
        let url = format!("{}/sites", self.base_url);
        let list: SiteList = self.send(self.http_client.get(&url)).await?;

        Ok(list
            .site_entry
            .into_iter()
            .filter(|s| s.permission_level != "siteUnverifiedUser")
            .collect())
    }

    pub async fn site(&self, site_url: &str) -> Result<SiteEntry, RemoteError> {
        let url = self.site_path(site_url, "");
        self.send(self.http_client.get(&url)).await
    }

    /// Sitemaps submitted for `site_url`.
    pub async fn sitemaps(&self, site_url: &str) -> Result<Vec<SitemapEntry>, RemoteError> {
        let url = self.sitemap_path(site_url, None);
        let list: SitemapList = self.send(self.http_client.get(&url)).await?;
        Ok(list.sitemap)
    }

    pub async fn sitemap(&self, site_url: &str, feedpath: &str) -> Result<SitemapEntry, RemoteError> {
        let url = self.sitemap_path(site_url, Some(feedpath));
        self.send(self.http_client.get(&url)).await
    }

    fn sitemap_path(&self, site_url: &str, feedpath: Option<&str>) -> String {
        match feedpath {
            Some(feedpath) => {
                self.site_path(site_url, &format!("/sitemaps/{}", urlencoding::encode(feedpath)))
            }
            None => self.site_path(site_url, "/sitemaps"),
        }
    }

    fn site_path(&self, site_url: &str, rest: &str) -> String {
        format!(
            "{}/sites/{}{}",
            self.base_url,
            urlencoding::encode(site_url),
            rest
        )
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, RemoteError> {
        let response = request
            .bearer_auth(self.token())
            .send()
            .await
            .map_err(|e| RemoteError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_status(status, text));
        }

        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::Transient(e.to_string()))?;

        serde_json::from_str(&text).map_err(|e| RemoteError::Rejected(format!("bad response: {}", e)))
    }
}

#[async_trait]
impl QueryExecutor for SearchConsole {
    async fn execute(&self, site_url: &str, body: &QueryBody) -> Result<QueryResponse, RemoteError> {
        let url = self.site_path(site_url, "/searchAnalytics/query");
        let request = QueryRequest::from(body);

        tracing::debug!(
            site = site_url,
            start = %body.start_date,
            end = %body.end_date,
            start_row = body.start_row,
            "executing search analytics query"
        );

        self.send(self.http_client.post(&url).json(&request)).await
    }
}

// Quota reasons the API reports with 403 instead of 429.
const QUOTA_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded", "quotaExceeded"];

/// Only 401 means the token itself is no longer accepted. A 403 is about the
/// request (missing permission for the site, or a quota), so it stays local
/// to the query that received it.
pub fn classify_status(status: StatusCode, message: String) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED => RemoteError::AuthExpired,
        StatusCode::TOO_MANY_REQUESTS => RemoteError::Throttled,
        StatusCode::FORBIDDEN if QUOTA_REASONS.iter().any(|r| message.contains(r)) => {
            RemoteError::Throttled
        }
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        s if s.is_server_error() => RemoteError::Transient(format!("HTTP {}: {}", s, message)),
        s => RemoteError::Rejected(format!("HTTP {}: {}", s, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_range::DateRange;
    use chrono::NaiveDate;

    #[test]
    fn request_uses_api_field_names() {
        let day = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        let body = QueryBody::new(DateRange::new(day, day).unwrap())
            .with_dimensions(["date", "query"])
            .with_filters(vec!["country equals FRA".parse().unwrap()]);

        let json = serde_json::to_value(QueryRequest::from(&body)).unwrap();
        assert_eq!(json["startDate"], "2020-03-01");
        assert_eq!(json["endDate"], "2020-03-01");
        assert_eq!(json["rowLimit"], 25000);
        assert_eq!(json["startRow"], 0);
        assert_eq!(json["dimensions"][1], "query");
        assert_eq!(json["dimensionFilterGroups"][0]["filters"][0]["expression"], "FRA");
        assert!(json.get("searchType").is_none());
    }

    #[test]
    fn missing_rows_means_no_rows() {
        let response: QueryResponse =
            serde_json::from_str(r#"{"responseAggregationType": "byProperty"}"#).unwrap();
        assert!(response.rows.is_empty());
    }

    #[test]
    fn status_classification() {
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, String::new()),
            RemoteError::AuthExpired
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            RemoteError::Throttled
        );
        assert!(classify_status(StatusCode::BAD_GATEWAY, String::new()).is_retryable());
        assert!(!classify_status(StatusCode::BAD_REQUEST, String::new()).is_retryable());
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "gone".into()),
            RemoteError::NotFound(_)
        ));
    }

    #[test]
    fn forbidden_is_not_an_expired_token() {
        let quota = r#"{"error": {"code": 403, "errors": [{"reason": "quotaExceeded"}]}}"#;
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, quota.into()),
            RemoteError::Throttled
        );

        let permission = r#"{"error": {"code": 403, "message": "User does not have sufficient permission for site"}}"#;
        let error = classify_status(StatusCode::FORBIDDEN, permission.into());
        assert!(matches!(error, RemoteError::Rejected(_)));
        assert!(!error.is_retryable());
    }

    #[test]
    fn site_urls_are_path_encoded() {
        let client = SearchConsole::new("token")
            .unwrap()
            .with_base_url("http://localhost/v3/");
        assert_eq!(
            client.site_path("sc-domain:example.com", "/searchAnalytics/query"),
            "http://localhost/v3/sites/sc-domain%3Aexample.com/searchAnalytics/query"
        );
    }

    #[test]
    fn sitemap_paths_encode_site_and_feedpath() {
        let client = SearchConsole::new("token")
            .unwrap()
            .with_base_url("http://localhost/v3");
        assert_eq!(
            client.sitemap_path("https://www.example.com/", None),
            "http://localhost/v3/sites/https%3A%2F%2Fwww.example.com%2F/sitemaps"
        );
        assert_eq!(
            client.sitemap_path(
                "https://www.example.com/",
                Some("https://www.example.com/sitemap.xml")
            ),
            "http://localhost/v3/sites/https%3A%2F%2Fwww.example.com%2F/sitemaps/https%3A%2F%2Fwww.example.com%2Fsitemap.xml"
        );
    }

    #[test]
    fn sitemap_listing_parses() {
        let list: SitemapList = serde_json::from_str(
            r#"{"sitemap": [{
                "path": "https://www.example.com/sitemap.xml",
                "lastSubmitted": "2020-03-01T10:00:00.000Z",
                "isPending": false,
                "isSitemapsIndex": true,
                "type": "sitemap",
                "warnings": "0",
                "errors": "2"
            }]}"#,
        )
        .unwrap();
        assert_eq!(list.sitemap.len(), 1);
        assert!(list.sitemap[0].is_sitemaps_index);
        assert_eq!(list.sitemap[0].kind.as_deref(), Some("sitemap"));
        assert_eq!(list.sitemap[0].errors.as_deref(), Some("2"));

        let empty: SitemapList = serde_json::from_str("{}").unwrap();
        assert!(empty.sitemap.is_empty());
    }
}

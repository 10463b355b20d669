pub mod auth;
pub mod body;
pub mod client;
pub mod date_range;
pub mod dates;
pub mod error;
pub mod export;
pub mod fetch;
pub mod granularity;
pub mod progress;
pub mod prompt;
pub mod reauth;
pub mod report;
pub mod saved_query;
pub mod traffic;

pub use body::{FilterGroup, PAGE_CAP, QueryBody, build_bodies};
pub use client::{QueryExecutor, QueryResponse, RowRecord, SearchConsole, SiteEntry, SitemapEntry};
pub use date_range::{DateRange, Partition, partition};
pub use error::{Error, RemoteError, Result};
pub use fetch::{FetchConfig, FetchFailure, FetchResult, FetchScheduler, PassKind, PassOutcome};
pub use granularity::Granularity;
pub use reauth::{CredentialRetry, Reauthenticator};
pub use report::{FetchReport, fetch_report};

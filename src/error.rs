use chrono::NaiveDate;
use thiserror::Error;

/// Failure reported by the remote reporting service for one call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("credentials have expired")]
    AuthExpired,

    #[error("rate limited by the remote service")]
    Throttled,

    #[error("transient remote failure: {0}")]
    Transient(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Throttling and transient network faults are worth one more attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Throttled | RemoteError::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("there must be a problem with your start ({start}) and end date ({end})")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error(
        "your date range is {span} days, it can not be smaller than your frequency which is {interval} days"
    )]
    GranularityTooCoarse { interval: u32, span: i64 },

    #[error("unknown granularity: {0}")]
    UnknownGranularity(String),

    #[error("could not understand date {0:?}, try the YYYY-MM-DD format")]
    DateParse(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("re-authentication declined, aborting")]
    ReauthDeclined,

    #[error("results are empty, make sure the url is right and you have rights to query it")]
    EmptyResult,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlRead(#[from] toml::de::Error),

    #[error(transparent)]
    TomlWrite(#[from] toml::ser::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Error::Remote(RemoteError::AuthExpired))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

use std::time::Duration;
use thiserror::Error;

pub mod config;
pub mod display;
pub mod fetcher;
pub mod session;
pub mod status;
pub mod types;
pub mod writer;

// Re-export commonly used types
pub use crate::config::LeadConfig;
pub use fetcher::LeadFetcher;
pub use status::{Status, StatusLevel, StatusSink};
pub use types::{FetchOutcome, Provider, Record};
pub use writer::{append_records, ExportStatus, RecordWriter, SchemaPolicy};

/// The `LeadError` enum represents the failures that can occur while fetching or exporting leads.
#[derive(Error, Debug)]
pub enum LeadError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,
    /// A transport-level failure such as DNS, connection refused or TLS.
    #[error("HTTP request failed: {0}")]
    Transport(String),
    /// The upstream answered with a non-success status code.
    #[error("upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },
    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// Reading or writing the output file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Reading or writing CSV rows failed.
    #[error("CSV processing error: {0}")]
    Csv(#[from] csv::Error),
    /// The caller passed an argument outside the accepted range.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Loading or validating the configuration failed.
    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

impl LeadError {
    /// Only timeouts are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LeadError::Timeout)
    }
}

impl From<reqwest::Error> for LeadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LeadError::Timeout
        } else {
            LeadError::Transport(e.to_string())
        }
    }
}

/// A type alias for `Result` with the `LeadError` error type.
pub type Result<T> = std::result::Result<T, LeadError>;

// Constants

/// The default per-attempt timeout for provider requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(40);
/// The default number of send attempts per fetch.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// The unit of linear backoff; attempt `n` waits `n * DEFAULT_BASE_DELAY`.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);
/// The default number of leads kept per search.
pub const DEFAULT_LIMIT: usize = 10;
/// The default CSV output path.
pub const DEFAULT_OUTPUT_PATH: &str = "leads.csv";
/// Placeholder written when a provider omits a field.
pub const MISSING_VALUE: &str = "N/A";

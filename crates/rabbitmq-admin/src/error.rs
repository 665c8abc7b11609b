use reqwest::StatusCode;
use thiserror::Error;

/// Result type for management API calls.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the management API client.
#[derive(Debug, Error)]
pub enum Error {
    /// The management API answered with a non-success status.
    #[error("management API returned {0}: {1}")]
    Api(StatusCode, String),

    /// A privileged command was invoked under a name that does not match
    /// the active alias.
    #[error("command name not recognized")]
    CommandRejected,

    /// The HTTP request itself failed.
    #[error("management API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body could not be parsed.
    #[error("failed to parse management API response: {0}")]
    Json(#[from] serde_json::Error),

    /// The configured API URL is not a valid base URL.
    #[error("invalid management API URL: {0}")]
    Url(#[from] url::ParseError),
}

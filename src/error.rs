use thiserror::Error;

/// Why an outbound upstream call produced no data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("upstream request timed out")]
    Timeout,
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("upstream transport error: {0}")]
    Transport(String),
    #[error("upstream body could not be decoded: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }

    /// Rate-limit style rejections get the longer backoff.
    pub fn is_throttled(&self) -> bool {
        matches!(self, FetchError::Status(429) | FetchError::Status(403))
    }
}

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Upstream(#[from] FetchError),
    #[error("no hub produced flight data")]
    NoHubData,
    #[error("aggregation pass aborted: {0}")]
    PassAborted(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, Error>;

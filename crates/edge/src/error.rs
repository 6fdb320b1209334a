use thiserror::Error;

#[derive(Error, Debug)]
pub enum EdgeError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error("Malformed playlist: {0}")]
    MalformedPlaylist(String),

    #[error("Failed to fetch {url}: {reason}")]
    TransientFetch { url: String, reason: String },

    #[error("Playlist reload failed after {attempts} attempt(s): {last}")]
    ReloadAttemptsExhausted { attempts: u32, last: Box<EdgeError> },

    #[error("Segment {position} failed: {source}")]
    SegmentFetchFailed {
        position: u64,
        #[source]
        source: Box<EdgeError>,
    },

    #[error("Speculative fetch of segment {position} failed: {source}")]
    SpeculativeFetch {
        position: u64,
        #[source]
        source: Box<EdgeError>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Stream cancelled")]
    Cancelled,

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),
}

impl EdgeError {
    /// Whether another attempt of the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(status) => {
                status.is_server_error()
                    || *status == reqwest::StatusCode::REQUEST_TIMEOUT
                    || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            Self::TransientFetch { .. } | Self::IOError(_) => true,
            Self::RequestError(e) => {
                e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_decode()
            }
            // reloads may briefly serve a truncated document
            Self::MalformedPlaylist(_) => true,
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn transient(url: impl ToString, reason: impl ToString) -> Self {
        Self::TransientFetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type EdgeResult<T> = Result<T, EdgeError>;

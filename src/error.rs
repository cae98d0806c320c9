//! Error type shared by the async and blocking clients and everything built on them.
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed ({status}): check the Readwise access token")]
    Auth { status: StatusCode },
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("rate limited by Readwise (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("readwise error {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("{0}")]
    Validation(String),
    #[error("failed to start runtime for blocking client: {0}")]
    Runtime(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Failure of a whole sync or poll cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    State(#[from] crate::state::StateError),
}

impl ApiError {
    /// Whether the transport layer should retry the request.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::RateLimited { .. } => true,
            ApiError::Status { status, .. } => status.is_server_error(),
            ApiError::Transport(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }

    /// Map a non-success status and its body to the matching variant.
    pub(crate) fn from_status(
        status: StatusCode,
        body: String,
        target: &str,
        retry_after: Option<Duration>,
    ) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Auth { status },
            StatusCode::NOT_FOUND => ApiError::NotFound(target.to_string()),
            StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited { retry_after },
            _ => ApiError::Status { status, body },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let err = ApiError::from_status(StatusCode::NOT_FOUND, String::new(), "/highlights/1/", None);
        assert!(matches!(err, ApiError::NotFound(ref t) if t == "/highlights/1/"));

        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, String::new(), "/auth/", None);
        assert!(matches!(err, ApiError::Auth { .. }));

        let err = ApiError::from_status(
            StatusCode::TOO_MANY_REQUESTS,
            String::new(),
            "/list/",
            Some(Duration::from_secs(3)),
        );
        assert!(err.is_retryable());

        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, "oops".into(), "/list/", None);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("oops"));

        let err = ApiError::from_status(StatusCode::BAD_REQUEST, "bad".into(), "/list/", None);
        assert!(!err.is_retryable());
    }
}

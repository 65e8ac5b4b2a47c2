use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("session expired; please log in again")]
    SessionExpired,
    #[error("not logged in")]
    NotLoggedIn,
    #[error("{}: {}", .0.code.as_str(), .0.message)]
    Api(ApiError),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("notification feed failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("session store failed: {0}")]
    SessionStore(#[from] std::io::Error),
    #[error("malformed session data: {0}")]
    SessionData(#[from] serde_json::Error),
}

impl ClientError {
    pub fn api_code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Api(err) => Some(err.code),
            _ => None,
        }
    }
}

/// Best-effort error code for a non-2xx response whose body is not an `ApiError`.
pub(crate) fn code_for_status(status: u16) -> ErrorCode {
    match status {
        401 => ErrorCode::Unauthorized,
        403 => ErrorCode::Forbidden,
        404 => ErrorCode::NotFound,
        429 => ErrorCode::RateLimited,
        400..=499 => ErrorCode::Validation,
        _ => ErrorCode::Internal,
    }
}
